//! Relays state-change notifications captured from a third-party web chat
//! client into Kafka: raw, noisy, possibly-duplicated records come in;
//! a deduplicated, classified, broker-ready stream comes out.

pub mod api;
pub mod config;
pub mod dedup;
pub mod event;
pub mod prometheus;
pub mod routing;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod sinks;
pub mod source;
pub mod stats;
pub mod test_utils;
pub mod time;
pub mod transform;

pub use api::PipelineOutcome;
pub use config::Config;
pub use event::{EventCategory, NormalizedEvent, RawEvent};
pub use scheduler::{PollScheduler, SchedulerState};
pub use service::BridgeService;
