// prometheus exporter setup and metric names

use metrics::counter;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Counter for every raw event pulled from the capture layer, by category.
pub const BRIDGE_EVENTS_TOTAL: &str = "bridge_events_total";

/// Counter for per-event pipeline outcomes, by outcome label.
pub const BRIDGE_EVENT_OUTCOMES_TOTAL: &str = "bridge_event_outcomes_total";

/// Counter for suppressed duplicate sightings.
pub const BRIDGE_DUPLICATE_EVENTS_TOTAL: &str = "bridge_duplicate_events_total";

/// Counter for publishes, by destination.
pub const BRIDGE_EVENTS_PUBLISHED_TOTAL: &str = "bridge_events_published_total";

/// Counter for publish failures.
pub const BRIDGE_PUBLISH_ERRORS_TOTAL: &str = "bridge_publish_errors_total";

/// Counter for capture poll failures, by class (transient/fatal).
pub const BRIDGE_POLL_ERRORS_TOTAL: &str = "bridge_poll_errors_total";

/// Histogram of per-event processing time in seconds.
pub const BRIDGE_EVENT_PROCESSING_SECONDS: &str = "bridge_event_processing_duration_seconds";

/// Histogram of batch sizes per poll.
pub const BRIDGE_BATCH_SIZE: &str = "bridge_batch_size_events";

pub fn report_poll_error(class: &'static str) {
    counter!(BRIDGE_POLL_ERRORS_TOTAL, "class" => class).increment(1);
}

pub fn setup_metrics_recorder() -> PrometheusHandle {
    const PROCESSING_SECONDS: &[f64] = &[
        0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
    ];
    const BATCH_SIZES: &[f64] = &[1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(BRIDGE_EVENT_PROCESSING_SECONDS.to_string()),
            PROCESSING_SECONDS,
        )
        .unwrap()
        .set_buckets_for_metric(Matcher::Suffix("_batch_size_events".to_string()), BATCH_SIZES)
        .unwrap()
        .install_recorder()
        .unwrap()
}
