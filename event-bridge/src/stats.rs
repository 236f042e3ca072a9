//! Owned, injectable stats aggregator.
//!
//! Process-wide prometheus counters cover operations dashboards; this
//! aggregator additionally keeps an in-process, resettable view so several
//! bridge instances can run in one process (and under test) without
//! trampling each other. Snapshots are point-in-time and immutable; `reset`
//! zeroes everything and restarts the rate clock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::api::PipelineOutcome;

/// Fixed capacity of the rolling processing-time window. Oldest samples are
/// evicted first; the window is count-based, not time-based.
const LATENCY_SAMPLE_CAPACITY: usize = 1000;

#[derive(Debug, Default)]
struct Inner {
    total: u64,
    duplicates: u64,
    per_category: HashMap<String, u64>,
    per_outcome: HashMap<&'static str, u64>,
    per_destination: HashMap<String, u64>,
    latency_samples: Vec<f64>,
    latency_head: usize,
}

pub struct StatsAggregator {
    started_at: Mutex<Instant>,
    inner: Mutex<Inner>,
}

/// Point-in-time immutable view of the aggregator.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: f64,
    pub total_events: u64,
    pub duplicate_events: u64,
    pub events_per_sec: f64,
    pub per_category: HashMap<String, u64>,
    pub per_outcome: HashMap<&'static str, u64>,
    pub per_destination: HashMap<String, u64>,
    pub latency: LatencySummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        StatsAggregator {
            started_at: Mutex::new(Instant::now()),
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl StatsAggregator {
    pub fn new() -> StatsAggregator {
        StatsAggregator::default()
    }

    /// Observe one event's trip through the pipeline.
    pub fn record(&self, category: &str, outcome: &PipelineOutcome, elapsed: Duration) {
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        inner.total += 1;
        *inner.per_category.entry(category.to_string()).or_default() += 1;
        *inner.per_outcome.entry(outcome.label()).or_default() += 1;
        if let Some(destination) = outcome.destination() {
            *inner
                .per_destination
                .entry(destination.to_string())
                .or_default() += 1;
        }

        let sample = elapsed.as_secs_f64() * 1000.0;
        if inner.latency_samples.len() < LATENCY_SAMPLE_CAPACITY {
            inner.latency_samples.push(sample);
        } else {
            // Ring buffer: overwrite the oldest sample.
            let head = inner.latency_head;
            inner.latency_samples[head] = sample;
            inner.latency_head = (head + 1) % LATENCY_SAMPLE_CAPACITY;
        }
    }

    /// A suppressed duplicate only bumps the duplicate tally; it does not
    /// count as a processed event.
    pub fn record_duplicate(&self, _category: &str) {
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        inner.duplicates += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock().expect("stats lock poisoned");
        let uptime = self
            .started_at
            .lock()
            .expect("stats lock poisoned")
            .elapsed()
            .as_secs_f64();

        let samples = &inner.latency_samples;
        let latency = if samples.is_empty() {
            LatencySummary {
                samples: 0,
                min_ms: 0.0,
                max_ms: 0.0,
                mean_ms: 0.0,
            }
        } else {
            let mut min = f64::MAX;
            let mut max = f64::MIN;
            let mut sum = 0.0;
            for &s in samples {
                min = min.min(s);
                max = max.max(s);
                sum += s;
            }
            LatencySummary {
                samples: samples.len(),
                min_ms: min,
                max_ms: max,
                mean_ms: sum / samples.len() as f64,
            }
        };

        StatsSnapshot {
            uptime_secs: uptime,
            total_events: inner.total,
            duplicate_events: inner.duplicates,
            events_per_sec: if uptime > 0.0 {
                inner.total as f64 / uptime
            } else {
                0.0
            },
            per_category: inner.per_category.clone(),
            per_outcome: inner.per_outcome.clone(),
            per_destination: inner.per_destination.clone(),
            latency,
        }
    }

    /// Operator-commanded reset: zero all counters and restart the rate
    /// clock.
    pub fn reset(&self) {
        *self.inner.lock().expect("stats lock poisoned") = Inner::default();
        *self.started_at.lock().expect("stats lock poisoned") = Instant::now();
    }
}
