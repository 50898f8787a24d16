use std::sync::{Arc, Weak};

use health::HealthHandle;
use rdkafka::{
    consumer::{Consumer, ConsumerContext, StreamConsumer},
    error::KafkaError,
    ClientConfig, ClientContext, Message,
};
use tracing::{debug, info};

use crate::config::{ConsumerConfig, KafkaConfig};

/// Reports liveness from the librdkafka statistics callback, which keeps
/// firing while the client loop runs even when the topic is idle.
pub struct ConsumerLiveness {
    liveness: HealthHandle,
}

impl ClientContext for ConsumerLiveness {
    fn stats(&self, _: rdkafka::Statistics) {
        self.liveness.report_healthy_blocking();
    }
}

impl ConsumerContext for ConsumerLiveness {}

/// One message read from the topic, detached from the consumer buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedMessage {
    /// Empty when the broker delivered a message without payload
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
    /// Broker timestamp in milliseconds since the epoch
    pub timestamp_millis: Option<i64>,
}

#[derive(Clone)]
pub struct SingleTopicConsumer {
    inner: Arc<Inner>,
}

struct Inner {
    consumer: StreamConsumer<ConsumerLiveness>,
    topic: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RecvErr {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
}

#[derive(Debug, thiserror::Error)]
pub enum OffsetErr {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("Consumer gone")]
    Gone,
}

pub fn client_config(
    common_config: &KafkaConfig,
    consumer_config: &ConsumerConfig,
) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", common_config.bootstrap_servers())
        .set("statistics.interval.ms", "10000")
        .set("group.id", &consumer_config.kafka_consumer_group)
        .set(
            "auto.offset.reset",
            &consumer_config.kafka_consumer_offset_reset,
        )
        .set("enable.auto.commit", "true")
        .set(
            "auto.commit.interval.ms",
            consumer_config
                .kafka_consumer_auto_commit_interval_ms
                .to_string(),
        );

    // Offsets are stored explicitly once a message has been handled
    client_config.set("enable.auto.offset.store", "false");

    if let Some(connection_string) = common_config
        .event_hub_connection_string
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        client_config
            .set("security.protocol", "sasl_ssl")
            .set("sasl.mechanism", "PLAIN")
            .set("sasl.username", "$ConnectionString")
            .set("sasl.password", connection_string);
    } else if common_config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    client_config
}

impl SingleTopicConsumer {
    pub fn new(
        common_config: KafkaConfig,
        consumer_config: ConsumerConfig,
        liveness: HealthHandle,
    ) -> Result<Self, KafkaError> {
        common_config
            .validate()
            .map_err(|err| KafkaError::ClientCreation(err.to_string()))?;

        let client_config = client_config(&common_config, &consumer_config);
        debug!(
            "rdkafka consumer configured for {}",
            common_config.bootstrap_servers()
        );

        let consumer: StreamConsumer<ConsumerLiveness> =
            client_config.create_with_context(ConsumerLiveness { liveness })?;
        consumer.subscribe(&[consumer_config.kafka_consumer_topic.as_str()])?;
        info!(
            topic = %consumer_config.kafka_consumer_topic,
            group = %consumer_config.kafka_consumer_group,
            "subscribed to topic"
        );

        let inner = Inner {
            consumer,
            topic: consumer_config.kafka_consumer_topic,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// Waits for the next message. The returned offset must be stored once
    /// the message has been handled, whatever the outcome.
    pub async fn recv(&self) -> Result<(ConsumedMessage, Offset), RecvErr> {
        let message = self.inner.consumer.recv().await?;

        let offset = Offset {
            handle: Arc::downgrade(&self.inner),
            partition: message.partition(),
            offset: message.offset(),
        };

        let consumed = ConsumedMessage {
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            partition: message.partition(),
            offset: message.offset(),
            timestamp_millis: message.timestamp().to_millis(),
        };

        Ok((consumed, offset))
    }
}

pub struct Offset {
    handle: Weak<Inner>,
    partition: i32,
    offset: i64,
}

impl Offset {
    pub fn store(self) -> Result<(), OffsetErr> {
        let inner = self.handle.upgrade().ok_or(OffsetErr::Gone)?;
        // librdkafka commits the stored offset + 1
        inner
            .consumer
            .store_offset(&inner.topic, self.partition, self.offset)?;
        Ok(())
    }
}
