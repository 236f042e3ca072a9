//! Suppression of repeated notifications for the same logical state change.
//!
//! The web client re-announces state liberally: the same ack can surface
//! several times in a row, contact records are re-emitted on every roster
//! touch. The filter keys each sighting by `(entity, category, sub-state)`
//! and suppresses repeats inside a per-category retention window.

use std::collections::HashMap;
use std::time::Duration;

use crate::event::RawEvent;
use crate::time::now_ms;

/// Composite identity of one logical state change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    entity_id: String,
    category: String,
    sub_state: String,
}

/// Derive the dedup key for a raw event. Events without an extractable
/// entity identifier yield `None` and are never deduplicated: silently
/// dropping unidentifiable events would be worse than a rare duplicate.
pub fn derive_key(raw: &RawEvent) -> Option<DedupKey> {
    let entity_id = raw.entity_id()?;
    // Distinguish sightings of the same entity in different sub-states, so
    // e.g. "delivered" does not suppress the later "read" for the same
    // message.
    let sub_state = match raw.payload.get("ack").and_then(serde_json::Value::as_i64) {
        Some(level) => level.to_string(),
        None => raw.subcategory().unwrap_or_default().to_string(),
    };
    Some(DedupKey {
        entity_id,
        category: raw.category.clone(),
        sub_state,
    })
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Window for message acknowledgement churn.
    pub ack_window: Duration,
    /// Window for low-churn roster entities (contacts, chats); much longer
    /// so near-static state is not re-emitted.
    pub contact_window: Duration,
    /// Window for everything else.
    pub default_window: Duration,
    /// Population ceiling that triggers a sweep before the next insert.
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> DedupConfig {
        DedupConfig {
            ack_window: Duration::from_secs(300),
            contact_window: Duration::from_secs(1800),
            default_window: Duration::from_secs(600),
            max_entries: 1000,
        }
    }
}

pub struct DeduplicationFilter {
    config: DedupConfig,
    last_seen: HashMap<DedupKey, i64>,
}

impl DeduplicationFilter {
    pub fn new(config: DedupConfig) -> DeduplicationFilter {
        DeduplicationFilter {
            config,
            last_seen: HashMap::new(),
        }
    }

    /// Whether the event is a fresh state change that should continue down
    /// the pipeline. Suppressed sightings do NOT refresh the timestamp: a
    /// burst of duplicates must not perpetually block the next real
    /// occurrence.
    pub fn should_process(&mut self, raw: &RawEvent) -> bool {
        self.should_process_at(raw, now_ms())
    }

    pub fn should_process_at(&mut self, raw: &RawEvent, now_ms: i64) -> bool {
        let Some(key) = derive_key(raw) else {
            return true; // fail open
        };
        let window_ms = self.window_for(&raw.category).as_millis() as i64;

        if let Some(&last) = self.last_seen.get(&key) {
            // Exactly at the boundary still counts as a duplicate; only a
            // sighting strictly older than the window is fresh.
            if now_ms - last <= window_ms {
                return false;
            }
        }

        if self.last_seen.len() >= self.config.max_entries {
            self.sweep(now_ms);
            // A burst of distinct fresh keys can leave the window sweep
            // with nothing to remove; the ceiling still holds, so force
            // out the oldest-seen entries to make room.
            if self.last_seen.len() >= self.config.max_entries {
                self.evict_oldest(self.last_seen.len() - self.config.max_entries + 1);
            }
        }
        self.last_seen.insert(key, now_ms);
        true
    }

    /// Number of live cache entries.
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    fn window_for(&self, category: &str) -> Duration {
        match category {
            "message_ack" => self.config.ack_window,
            "contact" | "chat" => self.config.contact_window,
            _ => self.config.default_window,
        }
    }

    /// One full sweep removing every entry older than its category window.
    /// Only triggered at the size ceiling; there are no per-entry timers.
    fn sweep(&mut self, now_ms: i64) {
        let config = self.config.clone();
        self.last_seen.retain(|key, &mut last| {
            let window_ms = match key.category.as_str() {
                "message_ack" => config.ack_window,
                "contact" | "chat" => config.contact_window,
                _ => config.default_window,
            }
            .as_millis() as i64;
            now_ms - last <= window_ms
        });
    }

    /// Remove the `count` least recently seen entries. An evicted entry's
    /// next sighting passes as fresh again; under a burst that forces
    /// eviction, a rare duplicate is the accepted cost of staying bounded.
    fn evict_oldest(&mut self, count: usize) {
        let mut entries: Vec<(DedupKey, i64)> = self
            .last_seen
            .iter()
            .map(|(key, &last)| (key.clone(), last))
            .collect();
        entries.sort_by_key(|&(_, last)| last);
        for (key, _) in entries.into_iter().take(count) {
            self.last_seen.remove(&key);
        }
    }
}
