// ============================================================================
// Event Bus Configuration
// ============================================================================

use crate::constants::{
    DEFAULT_EVENT_EXCHANGE, DEFAULT_EVENT_MAX_RETRIES, DEFAULT_EVENT_RETRY_BACKOFF_MS,
};
use crate::env_or;

/// Event bus configuration (Kafka-backed topic exchange)
#[derive(Clone, Debug)]
pub struct EventsConfig {
    /// false = in-process bus (single binary / tests)
    pub enabled: bool,
    /// Comma-separated list of Kafka brokers (e.g., "kafka1:9092,kafka2:9092")
    pub brokers: String,
    /// Name of the topic exchange every service publishes into
    pub exchange: String,
    /// Partitions used when the exchange topic has to be created
    pub exchange_partitions: i32,
    pub replication_factor: i32,
    /// SSL/TLS enabled
    pub ssl_enabled: bool,
    /// SASL mechanism (e.g., "SCRAM-SHA-256", "PLAIN")
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    /// Path to CA certificate file (for self-signed certificates)
    pub ssl_ca_location: Option<String>,
    // producer-specific settings
    pub producer_acks: String, // "all" | "1" | "0"
    pub producer_compression: String,
    pub producer_message_timeout_ms: u32,
    // consumer-specific settings
    pub consumer_session_timeout_ms: u32,
    pub consumer_auto_offset_reset: String, // "earliest" | "latest"
    // handler retry policy
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl EventsConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            enabled: env_or("EVENTS_ENABLED", true),
            brokers: std::env::var("KAFKA_BROKERS")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            exchange: std::env::var("EVENT_EXCHANGE")
                .unwrap_or_else(|_| DEFAULT_EVENT_EXCHANGE.to_string()),
            exchange_partitions: env_or("EVENT_EXCHANGE_PARTITIONS", 3),
            replication_factor: env_or("EVENT_EXCHANGE_REPLICATION", 1),
            ssl_enabled: env_or("KAFKA_SSL_ENABLED", false),
            sasl_mechanism: std::env::var("KAFKA_SASL_MECHANISM").ok(),
            sasl_username: std::env::var("KAFKA_SASL_USERNAME").ok(),
            sasl_password: std::env::var("KAFKA_SASL_PASSWORD").ok(),
            ssl_ca_location: std::env::var("KAFKA_SSL_CA_LOCATION").ok(),
            producer_acks: std::env::var("KAFKA_PRODUCER_ACKS")
                .unwrap_or_else(|_| "all".to_string()),
            producer_compression: std::env::var("KAFKA_PRODUCER_COMPRESSION")
                .unwrap_or_else(|_| "snappy".to_string()),
            producer_message_timeout_ms: env_or("KAFKA_PRODUCER_MESSAGE_TIMEOUT_MS", 30_000),
            consumer_session_timeout_ms: env_or("KAFKA_CONSUMER_SESSION_TIMEOUT_MS", 30_000),
            consumer_auto_offset_reset: std::env::var("KAFKA_AUTO_OFFSET_RESET")
                .unwrap_or_else(|_| "earliest".to_string()),
            max_retries: env_or("EVENTS_MAX_RETRIES", DEFAULT_EVENT_MAX_RETRIES),
            retry_backoff_ms: env_or("EVENTS_RETRY_BACKOFF_MS", DEFAULT_EVENT_RETRY_BACKOFF_MS),
        }
    }

    /// Dead-letter topic paired with the exchange
    pub fn dlq_topic(&self) -> String {
        format!("{}-dlq", self.exchange)
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            brokers: "localhost:9092".to_string(),
            exchange: DEFAULT_EVENT_EXCHANGE.to_string(),
            exchange_partitions: 3,
            replication_factor: 1,
            ssl_enabled: false,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            ssl_ca_location: None,
            producer_acks: "all".to_string(),
            producer_compression: "snappy".to_string(),
            producer_message_timeout_ms: 30_000,
            consumer_session_timeout_ms: 30_000,
            consumer_auto_offset_reset: "earliest".to_string(),
            max_retries: DEFAULT_EVENT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_EVENT_RETRY_BACKOFF_MS,
        }
    }
}
