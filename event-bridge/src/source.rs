use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::RawEvent;

/// Message fragments that identify the capture source as permanently gone
/// for this run. Anything else is treated as transient and retried.
const FATAL_PATTERNS: &[&str] = &[
    "session closed",
    "target closed",
    "browser has disconnected",
    "execution context was destroyed",
    "protocol error",
    "capture channel closed",
];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("capture source is gone: {0}")]
    Fatal(String),
    #[error("transient capture failure: {0}")]
    Transient(String),
}

impl SourceError {
    /// Classify an opaque capture-layer error message. The capture runtime
    /// is not ours, so pattern-matching its messages is the only signal we
    /// get for "gone for good" versus "try again".
    pub fn classify(message: impl Into<String>) -> SourceError {
        let message = message.into();
        let lowered = message.to_lowercase();
        if FATAL_PATTERNS.iter().any(|p| lowered.contains(p)) {
            SourceError::Fatal(message)
        } else {
            SourceError::Transient(message)
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Fatal(_))
    }
}

/// The minimal contract the pipeline needs from the capture layer: a lazy,
/// finite-per-call batch of raw records on demand, plus a connectivity
/// probe. Everything about the remote runtime's internals stays behind it.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn poll(&self) -> Result<Vec<RawEvent>, SourceError>;
    async fn is_healthy(&self) -> bool;
}

#[async_trait]
impl<T: CaptureSource + ?Sized> CaptureSource for std::sync::Arc<T> {
    async fn poll(&self) -> Result<Vec<RawEvent>, SourceError> {
        (**self).poll().await
    }

    async fn is_healthy(&self) -> bool {
        (**self).is_healthy().await
    }
}

/// Capture adapter backed by an mpsc channel: the capture layer pushes raw
/// records as it sees them, the scheduler drains whatever accumulated since
/// the last tick. A closed channel is a fatal condition.
pub struct ChannelSource {
    receiver: Mutex<mpsc::UnboundedReceiver<RawEvent>>,
}

impl ChannelSource {
    pub fn new(receiver: mpsc::UnboundedReceiver<RawEvent>) -> ChannelSource {
        ChannelSource {
            receiver: Mutex::new(receiver),
        }
    }

    /// Build a source together with the sending half handed to the capture
    /// layer.
    pub fn channel() -> (mpsc::UnboundedSender<RawEvent>, ChannelSource) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, ChannelSource::new(rx))
    }
}

#[async_trait]
impl CaptureSource for ChannelSource {
    async fn poll(&self) -> Result<Vec<RawEvent>, SourceError> {
        let mut receiver = self
            .receiver
            .lock()
            .map_err(|_| SourceError::Transient("capture receiver poisoned".to_string()))?;

        let mut batch = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(event) => batch.push(event),
                Err(mpsc::error::TryRecvError::Empty) => return Ok(batch),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if batch.is_empty() {
                        return Err(SourceError::classify("capture channel closed"));
                    }
                    // Drain what we already took; the next poll reports the
                    // closed channel.
                    return Ok(batch);
                }
            }
        }
    }

    async fn is_healthy(&self) -> bool {
        match self.receiver.lock() {
            // Still healthy while undrained events remain, even if the
            // sending side already went away.
            Ok(receiver) => !(receiver.is_closed() && receiver.is_empty()),
            Err(_) => false,
        }
    }
}
