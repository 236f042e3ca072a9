use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use event_bridge::config::Config;
use event_bridge::event::RawEvent;
use event_bridge::prometheus::setup_metrics_recorder;
use event_bridge::server;
use event_bridge::service::BridgeService;
use event_bridge::source::ChannelSource;

fn start_server(config: &Config) -> JoinHandle<()> {
    let router = server::router(setup_metrics_recorder());
    let bind = config.bind_address();

    tokio::task::spawn(async move {
        server::serve(router, &bind)
            .await
            .expect("failed to start serving metrics");
    })
}

/// Capture adapter for the binary: raw event records arrive as JSON lines
/// on stdin and are pushed into the drain channel the scheduler polls.
/// Embedders wire their own capture layer against `ChannelSource` instead.
fn start_capture_reader(tx: tokio::sync::mpsc::UnboundedSender<RawEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<RawEvent>(&line) {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("discarding undecodable raw event: {e}"),
                    }
                }
                Ok(None) => {
                    info!("capture input closed");
                    break;
                }
                Err(e) => {
                    warn!("failed to read capture input: {e}");
                    break;
                }
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("starting event bridge");

    let config = Config::init_with_defaults()
        .context("failed to load configuration from environment variables")?;

    let server_handle = start_server(&config);
    info!("started liveness/metrics server on {}", config.bind_address());

    let (tx, source) = ChannelSource::channel();
    let reader_handle = start_capture_reader(tx);

    let service = BridgeService::new(config, source);
    let state = service.run().await?;
    info!("event bridge terminated in state {state:?}");

    reader_handle.abort();
    server_handle.abort();
    Ok(())
}
