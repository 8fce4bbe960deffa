// ============================================================================
// Kafka-backed event bus
// ============================================================================
//
// Exchange  -> one Kafka topic (EVENT_EXCHANGE)
// Routing   -> envelope.routingKey
// Key       -> payload postId when present, so events for one post share a
//              partition; otherwise the routing key
// Queue     -> consumer group "{service}.{pattern}"; every service sees every
//              event, replicas of one service share the partitions
// Ack       -> offset committed after the handler succeeded or the event was
//              dead-lettered to "{exchange}-dlq"
//
// The producer is created on first use. Concurrent first publishers wait on
// the same initialisation.
//
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulse_config::EventsConfig;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{Message, Offset, TopicPartitionList};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::dispatch::{deliver_with_retry, DeadLetterEvent, DeliveryOutcome, RetryPolicy};
use crate::{metrics, queue_name};
use crate::{EventBus, EventBusError, EventEnvelope, EventHandler, RoutingPattern};

const ADMIN_TIMEOUT: Duration = Duration::from_secs(10);
const DLQ_SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub struct KafkaEventBus {
    config: EventsConfig,
    service: String,
    producer: OnceCell<FutureProducer>,
    policy: RetryPolicy,
}

impl KafkaEventBus {
    /// Create an unconnected bus; nothing talks to the brokers until
    /// `connect`, `publish` or `subscribe` is called.
    pub fn new(config: &EventsConfig, service: &str) -> anyhow::Result<Self> {
        if !config.enabled {
            anyhow::bail!("Cannot create Kafka event bus when events are disabled");
        }

        Ok(Self {
            config: config.clone(),
            service: service.to_string(),
            producer: OnceCell::new(),
            policy: RetryPolicy::from_config(config),
        })
    }

    async fn producer(&self) -> Result<&FutureProducer, EventBusError> {
        self.producer
            .get_or_try_init(|| async {
                self.declare_topics().await?;

                let producer: FutureProducer = create_client_config(&self.config)
                    .set("acks", &self.config.producer_acks)
                    .set("compression.type", &self.config.producer_compression)
                    .set(
                        "message.timeout.ms",
                        self.config.producer_message_timeout_ms.to_string(),
                    )
                    .create()
                    .map_err(|e| EventBusError::Connect(e.to_string()))?;

                info!(
                    exchange = %self.config.exchange,
                    service = %self.service,
                    "Kafka event bus connected"
                );
                Ok(producer)
            })
            .await
    }

    /// Create the exchange and dead-letter topics if missing
    async fn declare_topics(&self) -> Result<(), EventBusError> {
        let admin: AdminClient<DefaultClientContext> = create_client_config(&self.config)
            .create()
            .map_err(|e| EventBusError::Connect(e.to_string()))?;

        let dlq_topic = self.config.dlq_topic();
        let topics = [
            NewTopic::new(
                &self.config.exchange,
                self.config.exchange_partitions,
                TopicReplication::Fixed(self.config.replication_factor),
            ),
            NewTopic::new(
                &dlq_topic,
                1,
                TopicReplication::Fixed(self.config.replication_factor),
            ),
        ];
        let options = AdminOptions::new().operation_timeout(Some(ADMIN_TIMEOUT));

        let results = admin
            .create_topics(&topics, &options)
            .await
            .map_err(|e| EventBusError::Connect(e.to_string()))?;

        for result in results {
            match result {
                Ok(topic) => info!(topic = %topic, "Kafka topic created"),
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(topic = %topic, "Kafka topic already exists")
                }
                Err((topic, code)) => {
                    return Err(EventBusError::Connect(format!(
                        "failed to declare topic {}: {}",
                        topic, code
                    )));
                }
            }
        }

        Ok(())
    }

    fn encode(envelope: &EventEnvelope) -> Result<Vec<u8>, EventBusError> {
        Ok(serde_json::to_vec(envelope)?)
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn connect(&self) -> Result<(), EventBusError> {
        self.producer().await.map(|_| ())
    }

    async fn publish_envelope(&self, envelope: EventEnvelope) -> Result<(), EventBusError> {
        let producer = self.producer().await?;
        let payload = Self::encode(&envelope)?;

        let record = FutureRecord::to(&self.config.exchange)
            .key(envelope.partition_key())
            .payload(&payload);

        let delivery = match producer.send_result(record) {
            Ok(delivery) => delivery,
            Err((e, _)) => {
                metrics::EVENTS_PUBLISH_FAILURES_TOTAL
                    .with_label_values(&[&envelope.routing_key])
                    .inc();
                return Err(EventBusError::Publish(e.to_string()));
            }
        };

        let routing_key = envelope.routing_key.clone();
        let event_id = envelope.event_id;
        tokio::spawn(async move {
            match delivery.await {
                Ok(Ok(_)) => {
                    metrics::EVENTS_PUBLISHED_TOTAL
                        .with_label_values(&[&routing_key])
                        .inc();
                    debug!(event_id = %event_id, routing_key = %routing_key, "Event delivered");
                }
                Ok(Err((e, _))) => {
                    metrics::EVENTS_PUBLISH_FAILURES_TOTAL
                        .with_label_values(&[&routing_key])
                        .inc();
                    error!(event_id = %event_id, routing_key = %routing_key, error = %e, "Event delivery failed");
                }
                Err(_canceled) => {
                    metrics::EVENTS_PUBLISH_FAILURES_TOTAL
                        .with_label_values(&[&routing_key])
                        .inc();
                    warn!(event_id = %event_id, "Producer dropped before delivery report");
                }
            }
        });

        Ok(())
    }

    async fn publish_confirmed(&self, envelope: EventEnvelope) -> Result<(), EventBusError> {
        let producer = self.producer().await?;
        let payload = Self::encode(&envelope)?;

        let record = FutureRecord::to(&self.config.exchange)
            .key(envelope.partition_key())
            .payload(&payload);

        match producer.send(record, Timeout::Never).await {
            Ok(_) => {
                metrics::EVENTS_PUBLISHED_TOTAL
                    .with_label_values(&[&envelope.routing_key])
                    .inc();
                Ok(())
            }
            Err((e, _)) => {
                metrics::EVENTS_PUBLISH_FAILURES_TOTAL
                    .with_label_values(&[&envelope.routing_key])
                    .inc();
                Err(EventBusError::Publish(e.to_string()))
            }
        }
    }

    async fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), EventBusError> {
        let pattern = RoutingPattern::parse(pattern)?;
        // Topics must exist before the consumer group joins
        let producer = self.producer().await?.clone();

        let queue = queue_name(&self.service, pattern.as_str());
        let consumer: StreamConsumer = create_client_config(&self.config)
            .set("group.id", &queue)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.config.consumer_auto_offset_reset)
            .set(
                "session.timeout.ms",
                self.config.consumer_session_timeout_ms.to_string(),
            )
            .set("max.poll.interval.ms", "300000")
            .create()
            .map_err(|e| EventBusError::Subscribe(e.to_string()))?;

        consumer
            .subscribe(&[self.config.exchange.as_str()])
            .map_err(|e| EventBusError::Subscribe(e.to_string()))?;

        info!(queue = %queue, exchange = %self.config.exchange, "Queue bound to Kafka exchange");

        let worker = QueueWorker {
            queue,
            pattern,
            consumer,
            handler,
            policy: self.policy.clone(),
            dlq_producer: producer,
            dlq_topic: self.config.dlq_topic(),
        };
        tokio::spawn(worker.run());

        Ok(())
    }
}

/// Consumption loop for one queue
struct QueueWorker {
    queue: String,
    pattern: RoutingPattern,
    consumer: StreamConsumer,
    handler: Arc<dyn EventHandler>,
    policy: RetryPolicy,
    dlq_producer: FutureProducer,
    dlq_topic: String,
}

impl QueueWorker {
    async fn run(self) {
        loop {
            let (topic, partition, offset, payload) = match self.consumer.recv().await {
                Ok(message) => (
                    message.topic().to_string(),
                    message.partition(),
                    message.offset(),
                    message.payload().map(|p| p.to_vec()),
                ),
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "Kafka consumer error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            self.process(payload.as_deref()).await;
            self.commit(&topic, partition, offset);
        }
    }

    async fn process(&self, payload: Option<&[u8]>) {
        let Some(payload) = payload else {
            warn!(queue = %self.queue, "Skipping event with empty payload");
            return;
        };

        let envelope: EventEnvelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(queue = %self.queue, error = %e, "Skipping malformed event envelope");
                return;
            }
        };

        if !self.pattern.matches(&envelope.routing_key) {
            return;
        }

        let outcome =
            deliver_with_retry(&self.queue, self.handler.as_ref(), &envelope, &self.policy).await;
        if let DeliveryOutcome::DeadLettered(dead) = outcome {
            self.send_to_dlq(&dead).await;
        }
    }

    async fn send_to_dlq(&self, dead: &DeadLetterEvent) {
        let payload = match serde_json::to_vec(dead) {
            Ok(payload) => payload,
            Err(e) => {
                error!(event_id = %dead.envelope.event_id, error = %e, "Failed to encode dead letter");
                return;
            }
        };

        let record = FutureRecord::to(&self.dlq_topic)
            .key(dead.queue.as_str())
            .payload(&payload);

        match self
            .dlq_producer
            .send(record, Timeout::After(DLQ_SEND_TIMEOUT))
            .await
        {
            Ok(_) => info!(
                queue = %self.queue,
                event_id = %dead.envelope.event_id,
                dlq_topic = %self.dlq_topic,
                "Event moved to dead-letter queue"
            ),
            Err((e, _)) => error!(
                queue = %self.queue,
                event_id = %dead.envelope.event_id,
                error = %e,
                "Failed to write dead letter; event dropped"
            ),
        }
    }

    /// Commit the offset after the one just handled
    fn commit(&self, topic: &str, partition: i32, offset: i64) {
        let mut tpl = TopicPartitionList::new();
        if let Err(e) = tpl.add_partition_offset(topic, partition, Offset::Offset(offset + 1)) {
            error!(queue = %self.queue, error = %e, "Failed to build commit list");
            return;
        }
        if let Err(e) = self.consumer.commit(&tpl, CommitMode::Async) {
            warn!(queue = %self.queue, offset = offset, error = %e, "Offset commit failed");
        }
    }
}

/// Shared client settings: brokers, TLS and SASL.
fn create_client_config(config: &EventsConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", &config.brokers);
    client_config.set("security.protocol", "plaintext");

    if config.ssl_enabled {
        client_config.set("security.protocol", "ssl");
        if let Some(ca) = &config.ssl_ca_location {
            client_config.set("ssl.ca.location", ca);
        }
    }

    if let (Some(mechanism), Some(username), Some(password)) = (
        &config.sasl_mechanism,
        &config.sasl_username,
        &config.sasl_password,
    ) {
        client_config
            .set("sasl.mechanism", mechanism)
            .set("sasl.username", username)
            .set("sasl.password", password)
            .set(
                "security.protocol",
                if config.ssl_enabled {
                    "sasl_ssl"
                } else {
                    "sasl_plaintext"
                },
            );
    }

    client_config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_creation_fails_when_disabled() {
        let config = EventsConfig::default();
        let result = KafkaEventBus::new(&config, "post-service");
        assert!(result.is_err());
    }

    #[test]
    fn test_client_config_sasl_over_ssl() {
        let config = EventsConfig {
            enabled: true,
            ssl_enabled: true,
            sasl_mechanism: Some("SCRAM-SHA-256".to_string()),
            sasl_username: Some("svc".to_string()),
            sasl_password: Some("secret".to_string()),
            ..EventsConfig::default()
        };
        let client_config = create_client_config(&config);
        assert_eq!(client_config.get("security.protocol"), Some("sasl_ssl"));
        assert_eq!(client_config.get("sasl.username"), Some("svc"));
    }

    #[tokio::test]
    #[ignore] // Requires Kafka
    async fn test_connect_declares_exchange() {
        let config = EventsConfig {
            enabled: true,
            ..EventsConfig::default()
        };
        let bus = KafkaEventBus::new(&config, "pulse-test").unwrap();
        bus.connect().await.unwrap();
        // Second call reuses the producer
        bus.connect().await.unwrap();
    }
}
