use async_trait::async_trait;

use metrics::counter;
use tracing::info;

use crate::api::SinkError;
use crate::prometheus::BRIDGE_EVENTS_PUBLISHED_TOTAL;
use crate::sinks::Sink;

/// Sink for running the bridge without a broker: logs every payload.
pub struct PrintSink {}

#[async_trait]
impl Sink for PrintSink {
    async fn send(&self, destination: &str, payload: String) -> Result<(), SinkError> {
        info!("event for {destination}: {payload}");
        counter!(BRIDGE_EVENTS_PUBLISHED_TOTAL, "destination" => destination.to_string())
            .increment(1);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        true
    }
}
