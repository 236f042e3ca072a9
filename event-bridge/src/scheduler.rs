//! Polling scheduler: the single driver of the pipeline.
//!
//! One tick pulls one batch from the capture source and runs every record
//! through dedup → ignore check → transform → route → publish, in the order
//! the source returned them. Batches never overlap; the next tick is only
//! scheduled once the current one completed. Transient capture errors are
//! retried on a fixed delay up to a budget; fatal capture errors and the
//! stop command end the run.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::api::PipelineOutcome;
use crate::dedup::DeduplicationFilter;
use crate::event::{ignored_envelope, RawEvent};
use crate::prometheus::{
    report_poll_error, BRIDGE_BATCH_SIZE, BRIDGE_DUPLICATE_EVENTS_TOTAL,
    BRIDGE_EVENT_OUTCOMES_TOTAL, BRIDGE_EVENT_PROCESSING_SECONDS, BRIDGE_EVENTS_TOTAL,
};
use crate::routing::Router;
use crate::sinks::Sink;
use crate::source::{CaptureSource, SourceError};
use crate::stats::StatsAggregator;
use crate::transform::TransformEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Polling,
    Backoff,
    /// Terminal for this run; restarting means building a new scheduler.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: std::time::Duration,
    pub retry_delay: std::time::Duration,
    pub max_consecutive_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: std::time::Duration::from_secs(1),
            retry_delay: std::time::Duration::from_secs(5),
            max_consecutive_failures: 3,
        }
    }
}

pub struct PollScheduler<S, K> {
    source: S,
    sink: K,
    filter: DeduplicationFilter,
    engine: TransformEngine,
    router: Router,
    stats: Arc<StatsAggregator>,
    config: SchedulerConfig,
    state: SchedulerState,
    consecutive_failures: u32,
}

impl<S: CaptureSource, K: Sink> PollScheduler<S, K> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        sink: K,
        filter: DeduplicationFilter,
        engine: TransformEngine,
        router: Router,
        stats: Arc<StatsAggregator>,
        config: SchedulerConfig,
    ) -> PollScheduler<S, K> {
        PollScheduler {
            source,
            sink,
            filter,
            engine,
            router,
            stats,
            config,
            state: SchedulerState::Idle,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Drive the pipeline until a fatal capture error, an exhausted retry
    /// budget, or the stop command. The stop command is honored between
    /// ticks; a tick already in progress runs to completion.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> SchedulerState {
        if !self.source.is_healthy().await {
            warn!("capture source not healthy, refusing to start polling");
            self.state = SchedulerState::Stopped;
            return self.state;
        }
        self.state = SchedulerState::Polling;
        info!(
            "polling started, interval {:?}, retry budget {}",
            self.config.poll_interval, self.config.max_consecutive_failures
        );

        loop {
            let delay = match self.state {
                SchedulerState::Backoff => self.config.retry_delay,
                _ => self.config.poll_interval,
            };
            tokio::select! {
                _ = &mut shutdown => {
                    info!("stop command received");
                    self.state = SchedulerState::Stopped;
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.tick().await {
                Ok(_) => {
                    self.consecutive_failures = 0;
                    self.state = SchedulerState::Polling;
                }
                Err(err) if err.is_fatal() => {
                    report_poll_error("fatal");
                    error!("capture source is gone, stopping: {err}");
                    self.state = SchedulerState::Stopped;
                    break;
                }
                Err(err) => {
                    report_poll_error("transient");
                    self.consecutive_failures += 1;
                    if self.consecutive_failures >= self.config.max_consecutive_failures {
                        error!(
                            "giving up after {} consecutive capture failures: {err}",
                            self.consecutive_failures
                        );
                        self.state = SchedulerState::Stopped;
                        break;
                    }
                    warn!(
                        "capture poll failed ({} of {}), retrying in {:?}: {err}",
                        self.consecutive_failures,
                        self.config.max_consecutive_failures,
                        self.config.retry_delay
                    );
                    self.state = SchedulerState::Backoff;
                }
            }
        }

        info!("polling stopped");
        self.state
    }

    /// Pull one batch and process it to completion. Only capture-layer
    /// errors propagate; per-event failures are outcomes, not errors.
    async fn tick(&mut self) -> Result<usize, SourceError> {
        let batch = self.source.poll().await?;
        histogram!(BRIDGE_BATCH_SIZE).record(batch.len() as f64);
        if batch.is_empty() {
            return Ok(0);
        }
        debug!("processing batch of {} raw events", batch.len());

        let size = batch.len();
        for raw in batch {
            let category = raw.category.clone();
            counter!(BRIDGE_EVENTS_TOTAL, "category" => category.clone()).increment(1);

            let started = Instant::now();
            let outcome = self.process_event(raw).await;
            let elapsed = started.elapsed();

            histogram!(BRIDGE_EVENT_PROCESSING_SECONDS).record(elapsed.as_secs_f64());
            counter!(BRIDGE_EVENT_OUTCOMES_TOTAL, "outcome" => outcome.label()).increment(1);
            match &outcome {
                PipelineOutcome::Filtered => {
                    counter!(BRIDGE_DUPLICATE_EVENTS_TOTAL).increment(1);
                    self.stats.record_duplicate(&category);
                }
                PipelineOutcome::Failed { error } => {
                    warn!("publish failed for {category} event: {error}");
                    self.stats.record(&category, &outcome, elapsed);
                }
                _ => self.stats.record(&category, &outcome, elapsed),
            }
        }
        Ok(size)
    }

    async fn process_event(&mut self, raw: RawEvent) -> PipelineOutcome {
        if !self.filter.should_process(&raw) {
            return PipelineOutcome::Filtered;
        }

        if self.engine.is_ignored(&raw) {
            let destination = self.router.ignored_destination().to_string();
            let payload = ignored_envelope(&raw).to_string();
            return match self.sink.send(&destination, payload).await {
                Ok(()) => PipelineOutcome::Ignored { destination },
                Err(error) => PipelineOutcome::Failed { error },
            };
        }

        let Some(event) = self.engine.transform(&raw) else {
            return PipelineOutcome::Skipped {
                reason: "suppressed by transform",
            };
        };

        let destination = self.router.route(event.category).to_string();
        let payload = event.wire_payload().to_string();
        match self.sink.send(&destination, payload).await {
            Ok(()) => PipelineOutcome::Published { destination },
            Err(error) => PipelineOutcome::Failed { error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::config::Config;
    use crate::test_utils::{MemorySink, ScriptedSource};

    fn scheduler(
        source: ScriptedSource,
        sink: MemorySink,
    ) -> PollScheduler<ScriptedSource, MemorySink> {
        let config = Config::default_test_config();
        PollScheduler::new(
            source,
            sink,
            DeduplicationFilter::new(config.dedup_config()),
            TransformEngine::new(config.ignore_rule_set(), config.group_actions()),
            Router::new(config.destinations()),
            Arc::new(StatsAggregator::new()),
            SchedulerConfig {
                poll_interval: Duration::from_millis(10),
                retry_delay: Duration::from_millis(10),
                max_consecutive_failures: 3,
            },
        )
    }

    fn run_to_completion(
        scheduler: PollScheduler<ScriptedSource, MemorySink>,
    ) -> tokio::task::JoinHandle<SchedulerState> {
        let (_tx, rx) = oneshot::channel();
        // Leak the sender so the shutdown branch never fires in tests that
        // expect the scheduler to stop on its own.
        std::mem::forget(_tx);
        tokio::spawn(scheduler.run(rx))
    }

    #[tokio::test(start_paused = true)]
    async fn three_transient_failures_exhaust_the_retry_budget() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(SourceError::Transient("timeout".to_string())),
            Err(SourceError::Transient("timeout".to_string())),
            Err(SourceError::Transient("timeout".to_string())),
            // Would succeed, but the scheduler must never get here.
            Ok(vec![RawEvent::new("message", json!({"id": "x"}))]),
        ]));
        let config = Config::default_test_config();
        let scheduler = PollScheduler::new(
            source.clone(),
            MemorySink::new(),
            DeduplicationFilter::new(config.dedup_config()),
            TransformEngine::new(config.ignore_rule_set(), config.group_actions()),
            Router::new(config.destinations()),
            Arc::new(StatsAggregator::new()),
            SchedulerConfig {
                poll_interval: Duration::from_millis(10),
                retry_delay: Duration::from_millis(10),
                max_consecutive_failures: 3,
            },
        );
        let (_tx, rx) = oneshot::channel();
        std::mem::forget(_tx);
        let state = scheduler.run(rx).await;
        assert_eq!(state, SchedulerState::Stopped);
        // The exhausted budget stops polling before the fourth entry.
        assert_eq!(source.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_stops_without_retry() {
        let source = ScriptedSource::new(vec![
            Err(SourceError::classify("Session closed")),
            Ok(vec![]),
        ]);
        let scheduler = scheduler(source, MemorySink::new());
        let state = run_to_completion(scheduler).await.unwrap();
        assert_eq!(state, SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn a_successful_batch_resets_the_failure_counter() {
        let source = ScriptedSource::new(vec![
            Err(SourceError::Transient("timeout".to_string())),
            Err(SourceError::Transient("timeout".to_string())),
            Ok(vec![]),
            Err(SourceError::Transient("timeout".to_string())),
            Err(SourceError::Transient("timeout".to_string())),
            Err(SourceError::Transient("timeout".to_string())),
        ]);
        let scheduler = scheduler(source, MemorySink::new());
        let state = run_to_completion(scheduler).await.unwrap();
        // Six polls happened: the success in the middle reset the budget.
        assert_eq!(state, SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_source_never_starts_polling() {
        let source = ScriptedSource::single_batch(vec![]).unhealthy();
        let scheduler = scheduler(source, MemorySink::new());
        let (_tx, rx) = oneshot::channel();
        let state = scheduler.run(rx).await;
        assert_eq!(state, SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_command_is_observed_before_the_next_tick() {
        let source = ScriptedSource::new(vec![]);
        let scheduler = scheduler(source, MemorySink::new());
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(scheduler.run(rx));
        tx.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_order_is_preserved_through_publish() {
        let events = (0..5)
            .map(|i| {
                RawEvent::new(
                    "message",
                    json!({"id": format!("m{i}"), "type": "chat", "from": "1@c.us", "body": format!("b{i}")}),
                )
            })
            .collect();
        let source = ScriptedSource::new(vec![
            Ok(events),
            Err(SourceError::classify("Session closed")),
        ]);
        let sink = Arc::new(MemorySink::new());

        let config = Config::default_test_config();
        let scheduler = PollScheduler::new(
            source,
            sink.clone(),
            DeduplicationFilter::new(config.dedup_config()),
            TransformEngine::new(config.ignore_rule_set(), config.group_actions()),
            Router::new(config.destinations()),
            Arc::new(StatsAggregator::new()),
            SchedulerConfig {
                poll_interval: Duration::from_millis(10),
                retry_delay: Duration::from_millis(10),
                max_consecutive_failures: 3,
            },
        );
        let (_tx, rx) = oneshot::channel();
        std::mem::forget(_tx);
        scheduler.run(rx).await;

        let bodies: Vec<String> = sink
            .payloads_for("bridge_events")
            .iter()
            .map(|p| p["data"]["body"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(bodies, vec!["b0", "b1", "b2", "b3", "b4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_failure_does_not_halt_the_batch() {
        let events = vec![
            RawEvent::new(
                "message",
                json!({"id": "m1", "type": "chat", "from": "1@c.us", "body": "a"}),
            ),
            RawEvent::new(
                "message",
                json!({"id": "m2", "type": "chat", "from": "1@c.us", "body": "b"}),
            ),
        ];
        let source = ScriptedSource::new(vec![
            Ok(events),
            Err(SourceError::classify("Session closed")),
        ]);
        let sink = MemorySink::failing_first(1);
        let stats = Arc::new(StatsAggregator::new());

        let config = Config::default_test_config();
        let scheduler = PollScheduler::new(
            source,
            sink,
            DeduplicationFilter::new(config.dedup_config()),
            TransformEngine::new(config.ignore_rule_set(), config.group_actions()),
            Router::new(config.destinations()),
            stats.clone(),
            SchedulerConfig {
                poll_interval: Duration::from_millis(10),
                retry_delay: Duration::from_millis(10),
                max_consecutive_failures: 3,
            },
        );
        let state = run_to_completion(scheduler).await.unwrap();
        assert_eq!(state, SchedulerState::Stopped);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.per_outcome["failed"], 1);
        assert_eq!(snapshot.per_outcome["published"], 1);
    }
}
