//! Kafka-backed message sources
//!
//! Each worker gets its own `StreamConsumer` in the topic's consumer group,
//! so the broker spreads partitions across workers. Offsets are stored only
//! after the dispatcher returned and committed by librdkafka's periodic
//! auto-commit, which gives at-least-once delivery.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;

use super::source::{InboundMessage, MessageSource, SourceFactory};
use super::ConsumerError;
use crate::config::{ConsumersConfig, GlobalConsumerConfig, SecurityConfig, TopicSpec};

pub struct KafkaSourceFactory {
    global: GlobalConsumerConfig,
    security: Option<SecurityConfig>,
}

impl KafkaSourceFactory {
    pub fn new(config: &ConsumersConfig) -> Self {
        Self {
            global: config.global_consumer.clone(),
            security: config.security.clone(),
        }
    }

    fn client_config(&self, spec: &TopicSpec, worker: usize) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &spec.broker)
            .set("group.id", &spec.consumer.group_id)
            .set("client.id", format!("{}-consumer-{}", spec.name, worker))
            .set("auto.offset.reset", spec.auto_offset_reset().as_str())
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .set(
                "auto.commit.interval.ms",
                self.global.auto_commit_interval_ms.to_string(),
            )
            .set("session.timeout.ms", self.global.session_timeout_ms.to_string())
            .set("fetch.wait.max.ms", self.global.fetch_wait_max_ms.to_string());

        if let Some(security) = &self.security {
            config.set("security.protocol", &security.protocol);
            if let Some(sasl) = &security.sasl {
                config
                    .set("sasl.mechanism", &sasl.mechanism)
                    .set("sasl.username", &sasl.username)
                    .set("sasl.password", &sasl.password);
            }
        }

        config
    }
}

impl SourceFactory for KafkaSourceFactory {
    fn create(
        &self,
        spec: &TopicSpec,
        worker: usize,
    ) -> Result<Box<dyn MessageSource>, ConsumerError> {
        let client_error = |reason: String| ConsumerError::Client {
            topic: spec.name.clone(),
            worker,
            reason,
        };

        let consumer: StreamConsumer = self
            .client_config(spec, worker)
            .create()
            .map_err(|e| client_error(e.to_string()))?;
        consumer
            .subscribe(&[spec.name.as_str()])
            .map_err(|e| client_error(e.to_string()))?;

        Ok(Box::new(KafkaSource { consumer }))
    }
}

struct KafkaSource {
    consumer: StreamConsumer,
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn recv(&mut self) -> Option<Result<InboundMessage, ConsumerError>> {
        let received = match self.consumer.recv().await {
            Ok(message) => Ok(InboundMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                payload: message.payload().map(<[u8]>::to_vec),
            }),
            Err(e) => Err(ConsumerError::Broker(e.to_string())),
        };
        Some(received)
    }

    fn ack(&mut self, message: &InboundMessage) -> Result<(), ConsumerError> {
        // The committed offset is the next one to read
        self.consumer
            .store_offset(&message.topic, message.partition, message.offset + 1)
            .map_err(|e| ConsumerError::Broker(e.to_string()))
    }
}
