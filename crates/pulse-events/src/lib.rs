//! # Pulse Events
//!
//! Asynchronous propagation of state changes between services.
//!
//! Publishers send JSON payloads tagged with a dot-separated routing key
//! (`post.created`, `post.deleted`) into one topic exchange. Subscribers bind
//! a queue with an AMQP-style pattern and receive every matching event, one
//! at a time, at least once.
//!
//! Two backends implement [`EventBus`]:
//!
//! - [`KafkaEventBus`]: the exchange is a Kafka topic, each queue is a
//!   consumer group named `{service}.{pattern}`.
//! - [`InMemoryEventBus`]: channels inside one process, for local runs and
//!   tests.
//!
//! Handler failures are retried with exponential backoff and then moved to a
//! dead-letter destination (see [`dispatch`]).

mod bus;
pub mod dispatch;
mod envelope;
mod error;
pub mod events;
#[cfg(feature = "kafka")]
mod kafka;
mod memory;
pub mod metrics;
mod pattern;

pub use bus::{build_event_bus, handler_fn, EventBus, EventHandler, SharedEventBus};
pub use dispatch::{DeadLetterEvent, DeliveryOutcome, RetryPolicy};
pub use envelope::EventEnvelope;
pub use error::EventBusError;
pub use events::{PostCreated, PostDeleted, POST_CREATED, POST_DELETED};
#[cfg(feature = "kafka")]
pub use kafka::KafkaEventBus;
pub use memory::InMemoryEventBus;
pub use pattern::RoutingPattern;

/// Queue name for a service's subscription to `pattern`
pub fn queue_name(service: &str, pattern: &str) -> String {
    format!("{}.{}", service, pattern)
}
