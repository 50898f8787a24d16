pub mod config;
pub mod kafka_consumer;

/// Port of the Kafka-compatible endpoint exposed by every Event Hubs namespace.
pub const EVENT_HUB_KAFKA_PORT: u16 = 9093;
