use std::sync::Arc;
use std::time::Duration;

use common_kafka::kafka_consumer::{ConsumedMessage, SingleTopicConsumer};
use health::HealthHandle;
use metrics::counter;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::normalize::{BrokerMetadata, InboundMessage, MessageNormalizer, NormalizedRecord};
use crate::store::{DocumentStore, StoreError};
use crate::time::TimeSource;

const LOGGED_BODY_CHARS: usize = 200;

impl From<ConsumedMessage> for InboundMessage {
    /// Over the Kafka endpoint of Event Hubs, the partition id is the
    /// partition key and the offset is the sequence number.
    fn from(message: ConsumedMessage) -> Self {
        let enqueued_time = message.timestamp_millis.and_then(|ms| {
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
        });

        InboundMessage {
            payload: message.payload,
            metadata: BrokerMetadata {
                partition_key: message.partition.to_string(),
                sequence_number: message.offset,
                offset: message.offset.to_string(),
                enqueued_time,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
}

/// Creates the record, or replaces the stored one when its id already exists.
pub async fn write_record(
    store: &(dyn DocumentStore + Send + Sync),
    mut record: NormalizedRecord,
    now: String,
) -> Result<WriteOutcome, StoreError> {
    match store.create(record.id(), record.fields()).await {
        Ok(()) => Ok(WriteOutcome::Created),
        Err(StoreError::Conflict(_)) => {
            warn!("item with id {} already exists, updating", record.id());
            record.set("updated_at", Value::String(now));
            store.replace(record.id(), record.fields()).await?;
            Ok(WriteOutcome::Updated)
        }
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Created,
    Updated,
    Discarded,
    Failed,
    TimedOut,
}

impl HandleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleOutcome::Created => "created",
            HandleOutcome::Updated => "updated",
            HandleOutcome::Discarded => "discarded",
            HandleOutcome::Failed => "failed",
            HandleOutcome::TimedOut => "timed_out",
        }
    }
}

/// Turns one inbound message into a stored document. Never fails: every
/// problem is logged and reported through the returned outcome.
#[derive(Clone)]
pub struct MessageHandler {
    normalizer: MessageNormalizer,
    store: Arc<dyn DocumentStore + Send + Sync>,
    timesource: Arc<dyn TimeSource + Send + Sync>,
    processing_timeout: Duration,
}

impl MessageHandler {
    pub fn new(
        consumer_group: &str,
        store: Arc<dyn DocumentStore + Send + Sync>,
        timesource: Arc<dyn TimeSource + Send + Sync>,
        processing_timeout: Duration,
    ) -> Self {
        Self {
            normalizer: MessageNormalizer::new(consumer_group),
            store,
            timesource,
            processing_timeout,
        }
    }

    pub async fn handle(&self, message: InboundMessage) -> HandleOutcome {
        let partition = message.metadata.partition_key.clone();
        let sequence_number = message.metadata.sequence_number;

        let outcome = match tokio::time::timeout(self.processing_timeout, self.process(&message))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(
                    partition = %partition,
                    sequence_number,
                    "message abandoned after {:?}",
                    self.processing_timeout
                );
                HandleOutcome::TimedOut
            }
        };

        counter!("ingest_messages_total", "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    async fn process(&self, message: &InboundMessage) -> HandleOutcome {
        debug!("received message: {}", logged_body(&message.payload));

        let record = match self
            .normalizer
            .normalize(message, &self.timesource.current_time())
        {
            Ok(record) => record,
            Err(reason) => {
                error!(
                    partition = %message.metadata.partition_key,
                    sequence_number = message.metadata.sequence_number,
                    "discarding message: {}, body: {}",
                    reason,
                    logged_body(&message.payload)
                );
                return HandleOutcome::Discarded;
            }
        };

        let id = record.id().to_owned();
        match write_record(&*self.store, record, self.timesource.current_time()).await {
            Ok(WriteOutcome::Created) => {
                info!("added item {} to {}", id, self.store.collection());
                HandleOutcome::Created
            }
            Ok(WriteOutcome::Updated) => {
                info!("updated item {} in {}", id, self.store.collection());
                HandleOutcome::Updated
            }
            Err(err) => {
                error!("failed to write item {}: {}", id, err);
                HandleOutcome::Failed
            }
        }
    }
}

fn logged_body(payload: &[u8]) -> String {
    let body = String::from_utf8_lossy(payload);
    if body.chars().count() > LOGGED_BODY_CHARS {
        format!(
            "{}...",
            body.chars().take(LOGGED_BODY_CHARS).collect::<String>()
        )
    } else {
        body.into_owned()
    }
}

/// Reads the topic one message at a time and hands each one to the handler.
/// Partition order is kept since nothing is buffered or reordered.
pub struct StreamIngestor {
    consumer: SingleTopicConsumer,
    handler: MessageHandler,
    liveness: HealthHandle,
}

impl StreamIngestor {
    pub fn new(
        consumer: SingleTopicConsumer,
        handler: MessageHandler,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            consumer,
            handler,
            liveness,
        }
    }

    pub async fn run(self) {
        info!("consuming messages from {}", self.consumer.topic());

        loop {
            let (message, offset) = match self.consumer.recv().await {
                Ok(received) => received,
                Err(err) => {
                    counter!("ingest_receive_errors_total").increment(1);
                    error!("failed to receive message: {}", err);
                    continue;
                }
            };
            self.liveness.report_healthy().await;

            _ = self.handler.handle(message.into()).await;

            // Bad messages are not retried, the partition moves on in every case
            if let Err(err) = offset.store() {
                error!("failed to store offset: {}", err);
            }
        }
    }
}
