//! Transformation engine: maps raw vendor-shaped records to normalized
//! domain events.
//!
//! The engine runs two checks in order: ignore rules first (matched events
//! are routed to the ignored destination and never transformed), then an
//! ordered chain of category-specific mappers. Each mapper either maps,
//! suppresses, or declines so the next one is tried; if no mapper matches,
//! the original envelope passes through unchanged. Dropping is always an
//! explicit decision, never a fallthrough.

use std::collections::{HashMap, HashSet};

use crate::event::{EventCategory, NormalizedEvent, RawEvent};

pub mod ack;
pub mod jid;
pub mod message;
pub mod notification;
pub mod roster;

/// Result of one mapper in the chain.
pub enum MapOutcome {
    /// This mapper owns the event and produced its normalized form.
    Mapped(NormalizedEvent),
    /// This mapper owns the event and decided it is not worth emitting.
    Suppress,
    /// Not this mapper's category; try the next one.
    Decline,
}

/// One configured ignore rule: a category, optionally narrowed to a set of
/// subcategories.
#[derive(Debug, Clone, PartialEq)]
pub struct IgnoreRule {
    pub category: String,
    pub subcategories: Option<HashSet<String>>,
}

impl IgnoreRule {
    pub fn matches(&self, raw: &RawEvent) -> bool {
        if raw.category != self.category {
            return false;
        }
        match &self.subcategories {
            None => true,
            Some(set) => raw
                .subcategory()
                .map(|sub| set.contains(sub))
                .unwrap_or(false),
        }
    }
}

/// Parse the string-encoded rule list from configuration:
/// `category[:sub|sub|...][;category...]`. Empty segments are skipped.
pub fn parse_ignore_rules(encoded: &str) -> Vec<IgnoreRule> {
    encoded
        .split(';')
        .filter_map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() {
                return None;
            }
            let (category, subs) = match segment.split_once(':') {
                Some((category, subs)) => (category, Some(subs)),
                None => (segment, None),
            };
            let subcategories = subs.map(|subs| {
                subs.split('|')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<HashSet<_>>()
            });
            Some(IgnoreRule {
                category: category.trim().to_string(),
                subcategories,
            })
        })
        .collect()
}

type Mapper = Box<dyn Fn(&RawEvent) -> MapOutcome + Send + Sync>;

pub struct TransformEngine {
    ignore_rules: Vec<IgnoreRule>,
    mappers: Vec<Mapper>,
}

impl TransformEngine {
    pub fn new(ignore_rules: Vec<IgnoreRule>, group_actions: HashMap<String, String>) -> Self {
        // Order matters: notification types share the "message" category
        // with plain messages, so their mapper runs first.
        let mappers: Vec<Mapper> = vec![
            Box::new(ack::map),
            Box::new(move |raw| notification::map(raw, &group_actions)),
            Box::new(roster::map_contact),
            Box::new(roster::map_group_update),
            Box::new(roster::map_presence),
            Box::new(message::map),
        ];
        TransformEngine {
            ignore_rules,
            mappers,
        }
    }

    /// Whether a raw event matches a configured ignore rule. Evaluated
    /// before `transform`; ignored events never reach the mapper chain.
    pub fn is_ignored(&self, raw: &RawEvent) -> bool {
        self.ignore_rules.iter().any(|rule| rule.matches(raw))
    }

    /// Map a raw event to its normalized form, or `None` when a mapper
    /// explicitly suppressed it. Unmatched events pass through as a raw
    /// envelope.
    pub fn transform(&self, raw: &RawEvent) -> Option<NormalizedEvent> {
        for mapper in &self.mappers {
            match mapper(raw) {
                MapOutcome::Mapped(event) => return Some(event),
                MapOutcome::Suppress => return None,
                MapOutcome::Decline => continue,
            }
        }
        Some(passthrough(raw))
    }
}

impl Default for TransformEngine {
    fn default() -> Self {
        TransformEngine::new(Vec::new(), notification::default_group_actions())
    }
}

/// Fallback for categories no mapper owns: the original envelope, carried
/// unchanged under a raw category.
fn passthrough(raw: &RawEvent) -> NormalizedEvent {
    let body = serde_json::json!({
        "category": raw.category,
        "payload": raw.payload,
        "captured_at_ms": raw.captured_at_ms,
    });
    NormalizedEvent::from_raw(raw, EventCategory::Raw, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine_with_rules(encoded: &str) -> TransformEngine {
        TransformEngine::new(
            parse_ignore_rules(encoded),
            notification::default_group_actions(),
        )
    }

    #[test]
    fn parses_rules_with_and_without_subcategories() {
        let rules = parse_ignore_rules("message:ciphertext|e2e_notification;presence");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].category, "message");
        assert_eq!(
            rules[0].subcategories.as_ref().map(|s| s.len()),
            Some(2)
        );
        assert_eq!(rules[1].category, "presence");
        assert_eq!(rules[1].subcategories, None);

        assert!(parse_ignore_rules("").is_empty());
        assert!(parse_ignore_rules(" ; ").is_empty());
    }

    #[test]
    fn ignore_rule_with_subcategories_needs_a_subtype_match() {
        let engine = engine_with_rules("message:ciphertext");
        assert!(engine.is_ignored(&RawEvent::new("message", json!({"type": "ciphertext"}))));
        assert!(!engine.is_ignored(&RawEvent::new("message", json!({"type": "chat"}))));
        // No subtype on the event: a narrowed rule does not match.
        assert!(!engine.is_ignored(&RawEvent::new("message", json!({}))));
    }

    #[test]
    fn ignore_rule_without_subcategories_matches_the_whole_category() {
        let engine = engine_with_rules("presence");
        assert!(engine.is_ignored(&RawEvent::new("presence", json!({"type": "composing"}))));
        assert!(engine.is_ignored(&RawEvent::new("presence", json!({}))));
        assert!(!engine.is_ignored(&RawEvent::new("message", json!({}))));
    }

    #[test]
    fn unmatched_categories_pass_through_unchanged() {
        let engine = TransformEngine::default();
        let raw = RawEvent::new("battery", json!({"level": 93}));
        let event = engine.transform(&raw).expect("passthrough should emit");
        assert_eq!(event.category, EventCategory::Raw);
        assert_eq!(event.body["category"], "battery");
        assert_eq!(event.body["payload"], json!({"level": 93}));
    }

    #[test]
    fn passthrough_is_not_identity_destructive() {
        // Feeding the same unmatched shape through twice yields the same
        // body both times.
        let engine = TransformEngine::default();
        let raw = RawEvent {
            category: "battery".to_string(),
            payload: json!({"level": 93}),
            captured_at_ms: 1_700_000_000_000,
        };
        let first = engine.transform(&raw).unwrap();
        let second = engine.transform(&raw).unwrap();
        assert_eq!(first.body, second.body);
        assert_eq!(first.timestamp, second.timestamp);
    }

    #[test]
    fn chain_order_routes_shared_categories_to_the_right_mapper() {
        let engine = TransformEngine::default();
        let gp2 = RawEvent::new(
            "message",
            json!({"id": "1", "type": "gp2", "subtype": "remove"}),
        );
        assert_eq!(
            engine.transform(&gp2).unwrap().category,
            EventCategory::GroupAction
        );
        let chat = RawEvent::new(
            "message",
            json!({"id": "2", "type": "chat", "from": "1@c.us", "body": "hi"}),
        );
        assert_eq!(
            engine.transform(&chat).unwrap().category,
            EventCategory::Message
        );
    }
}
