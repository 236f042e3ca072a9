//! Main bridge service: owns the wiring between the capture source, the
//! pipeline, and the sink, and supervises the run until shutdown.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::dedup::DeduplicationFilter;
use crate::routing::Router;
use crate::scheduler::{PollScheduler, SchedulerConfig, SchedulerState};
use crate::sinks::kafka::KafkaSink;
use crate::sinks::print::PrintSink;
use crate::sinks::Sink;
use crate::source::CaptureSource;
use crate::stats::StatsAggregator;
use crate::transform::TransformEngine;

pub struct BridgeService<S> {
    config: Config,
    source: S,
    stats: Arc<StatsAggregator>,
}

impl<S: CaptureSource + 'static> BridgeService<S> {
    pub fn new(config: Config, source: S) -> BridgeService<S> {
        BridgeService {
            config,
            source,
            stats: Arc::new(StatsAggregator::new()),
        }
    }

    /// The service's stats aggregator; the handle stays valid across the
    /// whole run, so an operator surface can snapshot or reset it at any
    /// point.
    pub fn stats(&self) -> Arc<StatsAggregator> {
        self.stats.clone()
    }

    fn build_sink(&self) -> Result<Arc<dyn Sink>> {
        if self.config.print_sink {
            Ok(Arc::new(PrintSink {}))
        } else {
            let sink = KafkaSink::new(self.config.kafka.clone())
                .context("failed to connect the Kafka sink")?;
            Ok(Arc::new(sink))
        }
    }

    /// Run the service until ctrl-c or until the scheduler stops on its
    /// own (fatal capture error, exhausted retry budget).
    pub async fn run(self) -> Result<SchedulerState> {
        self.run_with_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl+c signal");
        })
        .await
    }

    /// Run with a custom shutdown signal (useful for testing).
    pub async fn run_with_shutdown(
        self,
        shutdown_signal: impl Future<Output = ()>,
    ) -> Result<SchedulerState> {
        let sink = self.build_sink()?;
        let reporter = self.config.stats_interval().map(|interval| {
            info!("reporting stats every {interval:?}");
            spawn_stats_reporter(self.stats.clone(), interval)
        });

        let scheduler = PollScheduler::new(
            self.source,
            sink,
            DeduplicationFilter::new(self.config.dedup_config()),
            TransformEngine::new(self.config.ignore_rule_set(), self.config.group_actions()),
            Router::new(self.config.destinations()),
            self.stats.clone(),
            SchedulerConfig {
                poll_interval: self.config.poll_interval(),
                retry_delay: self.config.retry_delay(),
                max_consecutive_failures: self.config.max_consecutive_failures,
            },
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let mut scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

        let state = tokio::select! {
            res = &mut scheduler_handle => res.context("scheduler task panicked")?,
            _ = shutdown_signal => {
                info!("received shutdown signal, stopping the scheduler...");
                let _ = shutdown_tx.send(());
                scheduler_handle.await.context("scheduler task panicked")?
            }
        };

        if let Some(reporter) = reporter {
            reporter.abort();
        }
        info!("bridge service stopped in state {state:?}");
        Ok(state)
    }
}

/// Timer-driven consumer of the stats snapshot. Display only; the
/// aggregator itself never schedules anything.
fn spawn_stats_reporter(
    stats: Arc<StatsAggregator>,
    interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // the first tick fires immediately
        loop {
            ticker.tick().await;
            match serde_json::to_string(&stats.snapshot()) {
                Ok(snapshot) => info!("pipeline stats: {snapshot}"),
                Err(e) => warn!("failed to serialize stats snapshot: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::event::RawEvent;
    use crate::source::SourceError;
    use crate::test_utils::ScriptedSource;

    #[tokio::test(start_paused = true)]
    async fn service_stops_on_its_own_after_a_fatal_capture_error() {
        let source = ScriptedSource::new(vec![
            Ok(vec![RawEvent::new(
                "message",
                json!({"id": "m1", "type": "chat", "from": "1@c.us", "body": "hi"}),
            )]),
            Err(SourceError::classify("Session closed")),
        ]);
        let mut config = Config::default_test_config();
        config.poll_interval_ms = 10;
        config.retry_delay_ms = 10;

        let service = BridgeService::new(config, source);
        let stats = service.stats();
        let state = service
            .run_with_shutdown(std::future::pending())
            .await
            .unwrap();

        assert_eq!(state, SchedulerState::Stopped);
        assert_eq!(stats.snapshot().total_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn service_honors_the_external_shutdown_signal() {
        let source = ScriptedSource::new(vec![]);
        let mut config = Config::default_test_config();
        config.poll_interval_ms = 10;

        let service = BridgeService::new(config, source);
        let state = service.run_with_shutdown(std::future::ready(())).await.unwrap();
        assert_eq!(state, SchedulerState::Stopped);
    }
}
