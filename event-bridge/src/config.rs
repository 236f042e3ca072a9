use std::collections::HashMap;
use std::time::Duration;

use envconfig::Envconfig;

use crate::dedup::DedupConfig;
use crate::routing::Destinations;
use crate::transform::notification::default_group_actions;
use crate::transform::{parse_ignore_rules, IgnoreRule};

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    /// Log payloads instead of publishing to Kafka.
    #[envconfig(default = "false")]
    pub print_sink: bool,

    // HTTP server configuration (liveness + metrics)
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,

    // Polling scheduler
    #[envconfig(default = "1000")]
    pub poll_interval_ms: u64,

    #[envconfig(default = "5000")]
    pub retry_delay_ms: u64,

    #[envconfig(default = "3")]
    pub max_consecutive_failures: u32,

    // Deduplication windows and cache ceiling
    #[envconfig(default = "300")]
    pub dedup_ack_window_secs: u64,

    #[envconfig(default = "1800")]
    pub dedup_contact_window_secs: u64,

    #[envconfig(default = "600")]
    pub dedup_default_window_secs: u64,

    #[envconfig(default = "1000")]
    pub dedup_max_entries: usize,

    // Transformation
    /// `category[:sub|sub][;category...]`
    #[envconfig(default = "message:ciphertext|e2e_notification")]
    pub ignore_rules: String,

    /// Optional overrides for the group action name table: `raw:name,raw:name`
    pub group_action_names: Option<String>,

    /// Interval for logging the stats snapshot; 0 disables the reporter.
    #[envconfig(default = "60")]
    pub stats_interval_secs: u64,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct KafkaConfig {
    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic
    #[envconfig(default = "400")]
    pub kafka_producer_queue_mib: u32, // Size of the in-memory producer queue in mebibytes
    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message
    #[envconfig(default = "1000000")]
    pub kafka_producer_message_max_bytes: u32, // message.max.bytes - max message size we will produce
    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,
    #[envconfig(default = "bridge_events")]
    pub kafka_topic: String,
    #[envconfig(default = "bridge_contacts")]
    pub kafka_contacts_topic: String,
    #[envconfig(default = "bridge_presence")]
    pub kafka_presence_topic: String,
    #[envconfig(default = "bridge_ignored")]
    pub kafka_ignored_topic: String,
    #[envconfig(default = "false")]
    pub kafka_tls: bool,
    #[envconfig(default = "")]
    pub kafka_client_id: String,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn default_test_config() -> Self {
        Self {
            print_sink: true,
            host: "127.0.0.1".to_string(),
            port: 0,
            poll_interval_ms: 1000,
            retry_delay_ms: 5000,
            max_consecutive_failures: 3,
            dedup_ack_window_secs: 300,
            dedup_contact_window_secs: 1800,
            dedup_default_window_secs: 600,
            dedup_max_entries: 1000,
            ignore_rules: "message:ciphertext|e2e_notification".to_string(),
            group_action_names: None,
            stats_interval_secs: 0,
            kafka: KafkaConfig {
                kafka_producer_linger_ms: 20,
                kafka_producer_queue_mib: 400,
                kafka_message_timeout_ms: 20000,
                kafka_producer_message_max_bytes: 1_000_000,
                kafka_compression_codec: "none".to_string(),
                kafka_hosts: "localhost:9092".to_string(),
                kafka_topic: "bridge_events".to_string(),
                kafka_contacts_topic: "bridge_contacts".to_string(),
                kafka_presence_topic: "bridge_presence".to_string(),
                kafka_ignored_topic: "bridge_ignored".to_string(),
                kafka_tls: false,
                kafka_client_id: "".to_string(),
            },
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        match self.stats_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn dedup_config(&self) -> DedupConfig {
        DedupConfig {
            ack_window: Duration::from_secs(self.dedup_ack_window_secs),
            contact_window: Duration::from_secs(self.dedup_contact_window_secs),
            default_window: Duration::from_secs(self.dedup_default_window_secs),
            max_entries: self.dedup_max_entries,
        }
    }

    pub fn ignore_rule_set(&self) -> Vec<IgnoreRule> {
        parse_ignore_rules(&self.ignore_rules)
    }

    /// The group action table: built-in defaults plus configured overrides.
    pub fn group_actions(&self) -> HashMap<String, String> {
        let mut table = default_group_actions();
        if let Some(overrides) = &self.group_action_names {
            for pair in overrides.split(',') {
                if let Some((raw, name)) = pair.split_once(':') {
                    let (raw, name) = (raw.trim(), name.trim());
                    if !raw.is_empty() && !name.is_empty() {
                        table.insert(raw.to_string(), name.to_string());
                    }
                }
            }
        }
        table
    }

    pub fn destinations(&self) -> Destinations {
        Destinations {
            default: self.kafka.kafka_topic.clone(),
            membership: self.kafka.kafka_contacts_topic.clone(),
            presence: self.kafka.kafka_presence_topic.clone(),
            ignored: self.kafka.kafka_ignored_topic.clone(),
        }
    }
}
