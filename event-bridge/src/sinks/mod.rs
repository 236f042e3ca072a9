use async_trait::async_trait;

use crate::api::SinkError;

pub mod kafka;
pub mod print;

/// Publisher boundary: deliver one payload to a logical destination.
/// Synchronous request/response semantics from the pipeline's point of
/// view; at-most-once, best-effort.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn send(&self, destination: &str, payload: String) -> Result<(), SinkError>;

    /// Connectivity probe; used by the orchestrator, not the pipeline.
    async fn is_connected(&self) -> bool;
}

#[async_trait]
impl<T: Sink + ?Sized> Sink for std::sync::Arc<T> {
    async fn send(&self, destination: &str, payload: String) -> Result<(), SinkError> {
        (**self).send(destination, payload).await
    }

    async fn is_connected(&self) -> bool {
        (**self).is_connected().await
    }
}
