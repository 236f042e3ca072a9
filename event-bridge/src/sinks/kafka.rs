use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use tracing::{debug, error, info};

use crate::api::SinkError;
use crate::config::KafkaConfig;
use crate::prometheus::{BRIDGE_EVENTS_PUBLISHED_TOTAL, BRIDGE_PUBLISH_ERRORS_TOTAL};
use crate::sinks::Sink;

struct KafkaContext;

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        gauge!("bridge_kafka_callback_queue_depth").set(stats.replyq as f64);
        gauge!("bridge_kafka_producer_queue_depth").set(stats.msg_cnt as f64);
        gauge!("bridge_kafka_producer_queue_depth_limit").set(stats.msg_max as f64);

        for (topic, stats) in stats.topics {
            gauge!(
                "bridge_kafka_produce_avg_batch_size_bytes",
                "topic" => topic.clone()
            )
            .set(stats.batchsize.avg as f64);
            gauge!(
                "bridge_kafka_produce_avg_batch_size_events",
                "topic" => topic
            )
            .set(stats.batchcnt.avg as f64);
        }

        for (_, stats) in stats.brokers {
            let id_string = format!("{}", stats.nodeid);
            counter!(
                "bridge_kafka_broker_tx_errors_total",
                "broker" => id_string.clone()
            )
            .absolute(stats.txerrs);
            counter!(
                "bridge_kafka_broker_rx_errors_total",
                "broker" => id_string
            )
            .absolute(stats.rxerrs);
        }
    }
}

pub struct KafkaSink {
    producer: FutureProducer<KafkaContext>,
}

impl KafkaSink {
    pub fn new(config: KafkaConfig) -> anyhow::Result<KafkaSink> {
        info!("connecting to Kafka brokers at {}...", config.kafka_hosts);

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("linger.ms", config.kafka_producer_linger_ms.to_string())
            .set(
                "message.max.bytes",
                config.kafka_producer_message_max_bytes.to_string(),
            )
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            )
            .set("compression.codec", config.kafka_compression_codec)
            .set(
                "queue.buffering.max.kbytes",
                (config.kafka_producer_queue_mib * 1024).to_string(),
            );

        if !config.kafka_client_id.is_empty() {
            client_config.set("client.id", &config.kafka_client_id);
        }

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer<KafkaContext> =
            client_config.create_with_context(KafkaContext)?;

        // Ping the cluster to make sure we can reach brokers, fail after 10 seconds
        drop(producer.client().fetch_metadata(
            Some("__consumer_offsets"),
            Timeout::After(Duration::new(10, 0)),
        )?);
        info!("connected to Kafka brokers");

        Ok(KafkaSink { producer })
    }

    fn kafka_send(&self, destination: &str, payload: &str) -> Result<DeliveryFuture, SinkError> {
        match self.producer.send_result(FutureRecord {
            topic: destination,
            payload: Some(payload),
            partition: None,
            key: None::<&str>,
            timestamp: None,
            headers: None,
        }) {
            Ok(ack) => Ok(ack),
            Err((e, _)) => match e.rdkafka_error_code() {
                Some(RDKafkaErrorCode::MessageSizeTooLarge) => {
                    counter!(BRIDGE_PUBLISH_ERRORS_TOTAL, "cause" => "message_size").increment(1);
                    Err(SinkError::MessageTooBig)
                }
                _ => {
                    counter!(BRIDGE_PUBLISH_ERRORS_TOTAL, "cause" => "produce_error").increment(1);
                    error!("failed to produce event: {}", e);
                    Err(SinkError::RetryableSinkError)
                }
            },
        }
    }

    async fn process_ack(destination: &str, delivery: DeliveryFuture) -> Result<(), SinkError> {
        match delivery.await {
            Err(_) => {
                // Cancelled due to timeout while retrying
                counter!(BRIDGE_PUBLISH_ERRORS_TOTAL, "cause" => "ack_timeout").increment(1);
                error!("failed to produce to Kafka before write timeout");
                Err(SinkError::RetryableSinkError)
            }
            Ok(Err((KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge), _))) => {
                counter!(BRIDGE_PUBLISH_ERRORS_TOTAL, "cause" => "message_size").increment(1);
                Err(SinkError::MessageTooBig)
            }
            Ok(Err((err, _))) => {
                counter!(BRIDGE_PUBLISH_ERRORS_TOTAL, "cause" => "produce_error").increment(1);
                error!("failed to produce to Kafka: {}", err);
                Err(SinkError::RetryableSinkError)
            }
            Ok(Ok(_)) => {
                counter!(BRIDGE_EVENTS_PUBLISHED_TOTAL, "destination" => destination.to_string())
                    .increment(1);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Sink for KafkaSink {
    async fn send(&self, destination: &str, payload: String) -> Result<(), SinkError> {
        let ack = self.kafka_send(destination, &payload)?;
        Self::process_ack(destination, ack).await
    }

    async fn is_connected(&self) -> bool {
        self.producer
            .client()
            .fetch_metadata(None, Timeout::After(Duration::new(5, 0)))
            .is_ok()
    }
}
