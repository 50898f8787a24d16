use envconfig::Envconfig;
use thiserror::Error;

use crate::EVENT_HUB_KAFKA_PORT;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("EVENT_HUB_CONNECTION_STRING has no usable Endpoint=sb://<namespace>/ part")]
    MissingEndpoint,
}

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    // Event Hubs namespace connection string, takes precedence over kafka_hosts when set
    pub event_hub_connection_string: Option<String>,

    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,
}

impl KafkaConfig {
    /// Brokers to bootstrap from: the namespace endpoint when a connection
    /// string is configured, `kafka_hosts` otherwise.
    pub fn bootstrap_servers(&self) -> String {
        self.event_hub_connection_string
            .as_deref()
            .and_then(event_hub_bootstrap_servers)
            .unwrap_or_else(|| self.kafka_hosts.clone())
    }

    pub fn event_hub_configured(&self) -> bool {
        self.event_hub_connection_string
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    /// Rejects a connection string the brokers cannot be derived from, which
    /// would otherwise send the Event Hubs credentials to `kafka_hosts`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(connection_string) = self.event_hub_connection_string.as_deref() else {
            return Ok(());
        };
        if connection_string.trim().is_empty()
            || event_hub_bootstrap_servers(connection_string).is_some()
        {
            Ok(())
        } else {
            Err(ConfigError::MissingEndpoint)
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct ConsumerConfig {
    // The Event Hub name when reading from Event Hubs
    #[envconfig(default = "iothub-events")]
    pub kafka_consumer_topic: String,

    #[envconfig(default = "$Default")]
    pub kafka_consumer_group: String,

    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String, // earliest, latest

    // Interval (in milliseconds) between Kafka offset commit attempts
    #[envconfig(default = "5000")]
    pub kafka_consumer_auto_commit_interval_ms: i32,
}

/// Extracts `<namespace>.servicebus.windows.net:9093` from the
/// `Endpoint=sb://<namespace>.servicebus.windows.net/` part of a connection string.
pub fn event_hub_bootstrap_servers(connection_string: &str) -> Option<String> {
    let endpoint = connection_string.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("endpoint")
            .then(|| value.trim())
    })?;

    let host = endpoint
        .trim_start_matches("sb://")
        .trim_end_matches('/')
        .split(':')
        .next()?;

    if host.is_empty() {
        return None;
    }
    Some(format!("{host}:{EVENT_HUB_KAFKA_PORT}"))
}
