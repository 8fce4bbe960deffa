use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use pulse_config::EventsConfig;
use tracing::info;

use crate::{EventBusError, EventEnvelope, InMemoryEventBus};

/// Consumer-side callback for one subscription
///
/// Returning `Err` asks the bus to retry the delivery; see
/// [`crate::dispatch`]. Implementations must tolerate redelivery.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &EventEnvelope) -> anyhow::Result<()>;
}

/// Topic exchange client
///
/// Handles are internally synchronised and meant to be shared as
/// [`SharedEventBus`] inside each service's context.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Establish the connection and declare the exchange.
    ///
    /// Idempotent; concurrent callers share a single attempt.
    async fn connect(&self) -> Result<(), EventBusError>;

    /// Enqueue an event. Delivery confirmation is observed in the background.
    async fn publish_envelope(&self, envelope: EventEnvelope) -> Result<(), EventBusError>;

    /// Publish and wait until the broker has acknowledged the event.
    async fn publish_confirmed(&self, envelope: EventEnvelope) -> Result<(), EventBusError> {
        self.publish_envelope(envelope).await
    }

    /// Bind a queue for `pattern` and run `handler` for every matching event,
    /// sequentially in delivery order.
    async fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), EventBusError>;

    /// Publish a JSON payload under `routing_key`.
    async fn publish(
        &self,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> Result<(), EventBusError> {
        self.publish_envelope(EventEnvelope::new(routing_key, payload))
            .await
    }
}

pub type SharedEventBus = Arc<dyn EventBus>;

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: &EventEnvelope) -> anyhow::Result<()> {
        (self.0)(event.clone()).await
    }
}

/// Wrap an async closure as an [`EventHandler`]
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Build the bus selected by configuration for `service`.
///
/// With `EVENTS_ENABLED=false` the service gets a private in-process bus:
/// events reach subscribers in the same process only.
pub async fn build_event_bus(
    config: &EventsConfig,
    service: &str,
) -> anyhow::Result<SharedEventBus> {
    if !config.enabled {
        info!(service = service, "Event bus running in-process (EVENTS_ENABLED=false)");
        let bus = InMemoryEventBus::new(service, crate::RetryPolicy::from_config(config));
        return Ok(Arc::new(bus));
    }

    #[cfg(feature = "kafka")]
    {
        let bus = crate::KafkaEventBus::new(config, service)?;
        bus.connect().await?;
        Ok(Arc::new(bus))
    }

    #[cfg(not(feature = "kafka"))]
    {
        anyhow::bail!("EVENTS_ENABLED=true requires the `kafka` feature")
    }
}
