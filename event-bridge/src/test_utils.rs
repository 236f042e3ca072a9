//! In-memory fakes for exercising the pipeline without a browser or a
//! broker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::SinkError;
use crate::event::RawEvent;
use crate::sinks::Sink;
use crate::source::{CaptureSource, SourceError};

/// Capture source that replays a scripted sequence of poll results. Once
/// the script is exhausted, every further poll returns an empty batch.
pub struct ScriptedSource {
    batches: Mutex<VecDeque<Result<Vec<RawEvent>, SourceError>>>,
    polls: AtomicUsize,
    healthy: AtomicBool,
}

impl ScriptedSource {
    pub fn new(batches: Vec<Result<Vec<RawEvent>, SourceError>>) -> ScriptedSource {
        ScriptedSource {
            batches: Mutex::new(batches.into()),
            polls: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn single_batch(events: Vec<RawEvent>) -> ScriptedSource {
        ScriptedSource::new(vec![Ok(events)])
    }

    pub fn unhealthy(self) -> ScriptedSource {
        self.healthy.store(false, Ordering::SeqCst);
        self
    }

    /// Number of polls served so far.
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureSource for ScriptedSource {
    async fn poll(&self) -> Result<Vec<RawEvent>, SourceError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.batches
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// Sink that records everything sent to it, optionally failing the first N
/// sends.
#[derive(Default)]
pub struct MemorySink {
    sent: Mutex<Vec<(String, String)>>,
    failures_remaining: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    pub fn failing_first(failures: usize) -> MemorySink {
        MemorySink {
            sent: Mutex::new(Vec::new()),
            failures_remaining: AtomicUsize::new(failures),
        }
    }

    /// Everything published so far, as `(destination, payload)` pairs in
    /// send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sink lock poisoned").clone()
    }

    /// Parsed payloads published to one destination.
    pub fn payloads_for(&self, destination: &str) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, p)| serde_json::from_str(&p).expect("payload should be JSON"))
            .collect()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn send(&self, destination: &str, payload: String) -> Result<(), SinkError> {
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SinkError::RetryableSinkError);
        }
        self.sent
            .lock()
            .expect("sink lock poisoned")
            .push((destination.to_string(), payload));
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        true
    }
}
