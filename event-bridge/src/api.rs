use thiserror::Error;

/// Failures surfaced by the publish side of the pipeline.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("transient publish failure, please retry")]
    RetryableSinkError,
    #[error("maximum message size exceeded")]
    MessageTooBig,
}

/// Per-event result of one trip through the pipeline. Drives stats updates
/// and caller-visible logging; never aborts the batch.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Normalized and delivered to the broker.
    Published { destination: String },
    /// Matched an ignore rule; original envelope delivered to the ignored
    /// destination.
    Ignored { destination: String },
    /// Suppressed by the deduplication filter.
    Filtered,
    /// Transformation decided the event is not worth emitting.
    Skipped { reason: &'static str },
    /// Publish failed; the rest of the batch still runs.
    Failed { error: SinkError },
}

impl PipelineOutcome {
    /// Stable label for stats and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineOutcome::Published { .. } => "published",
            PipelineOutcome::Ignored { .. } => "ignored",
            PipelineOutcome::Filtered => "filtered",
            PipelineOutcome::Skipped { .. } => "skipped",
            PipelineOutcome::Failed { .. } => "failed",
        }
    }

    /// Destination the event was (or would have been) delivered to, when
    /// one was resolved.
    pub fn destination(&self) -> Option<&str> {
        match self {
            PipelineOutcome::Published { destination }
            | PipelineOutcome::Ignored { destination } => Some(destination),
            _ => None,
        }
    }
}
