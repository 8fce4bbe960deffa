//! In-process implementation of the event bus.
//!
//! Every binding owns an unbounded channel drained by one task, so handlers
//! of a queue run one at a time in publish order. Clones made with
//! [`InMemoryEventBus::scoped`] share the exchange, which lets several
//! services in one process exchange events under their own queue names.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info, warn};

use crate::dispatch::{deliver_with_retry, DeadLetterEvent, DeliveryOutcome, RetryPolicy};
use crate::{metrics, queue_name};
use crate::{EventBus, EventBusError, EventEnvelope, EventHandler, RoutingPattern};

struct Binding {
    queue: String,
    pattern: RoutingPattern,
    sender: mpsc::UnboundedSender<EventEnvelope>,
}

struct Exchange {
    bindings: Mutex<Vec<Binding>>,
    published: Mutex<Vec<EventEnvelope>>,
    dead_letters: Arc<Mutex<Vec<DeadLetterEvent>>>,
    /// Deliveries queued or running across all bindings
    in_flight: Arc<AtomicUsize>,
    connected: OnceCell<()>,
    policy: RetryPolicy,
}

#[derive(Clone)]
pub struct InMemoryEventBus {
    service: String,
    exchange: Arc<Exchange>,
}

impl InMemoryEventBus {
    pub fn new(service: &str, policy: RetryPolicy) -> Self {
        Self {
            service: service.to_string(),
            exchange: Arc::new(Exchange {
                bindings: Mutex::new(Vec::new()),
                published: Mutex::new(Vec::new()),
                dead_letters: Arc::new(Mutex::new(Vec::new())),
                in_flight: Arc::new(AtomicUsize::new(0)),
                connected: OnceCell::new(),
                policy,
            }),
        }
    }

    /// Handle on the same exchange that binds queues under another service name
    pub fn scoped(&self, service: &str) -> Self {
        Self {
            service: service.to_string(),
            exchange: self.exchange.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.exchange.connected.initialized()
    }

    /// Every envelope published so far, in order
    pub fn published(&self) -> Vec<EventEnvelope> {
        lock(&self.exchange.published).clone()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterEvent> {
        lock(&self.exchange.dead_letters).clone()
    }

    /// Wait until every queued delivery has been handled or dead-lettered.
    ///
    /// Returns false if `timeout` elapsed first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.exchange.in_flight.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn connect(&self) -> Result<(), EventBusError> {
        self.exchange
            .connected
            .get_or_init(|| async {
                info!(service = %self.service, "In-memory event exchange declared");
            })
            .await;
        Ok(())
    }

    async fn publish_envelope(&self, envelope: EventEnvelope) -> Result<(), EventBusError> {
        self.connect().await?;

        lock(&self.exchange.published).push(envelope.clone());
        metrics::EVENTS_PUBLISHED_TOTAL
            .with_label_values(&[&envelope.routing_key])
            .inc();

        {
            let bindings = lock(&self.exchange.bindings);
            for binding in bindings.iter() {
                if !binding.pattern.matches(&envelope.routing_key) {
                    continue;
                }

                self.exchange.in_flight.fetch_add(1, Ordering::SeqCst);
                if binding.sender.send(envelope.clone()).is_err() {
                    self.exchange.in_flight.fetch_sub(1, Ordering::SeqCst);
                    warn!(queue = %binding.queue, "Queue consumer stopped, event dropped");
                }
            }
        }

        debug!(
            event_id = %envelope.event_id,
            routing_key = %envelope.routing_key,
            "Event published"
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), EventBusError> {
        let pattern = RoutingPattern::parse(pattern)?;
        self.connect().await?;

        let queue = queue_name(&self.service, pattern.as_str());
        let (sender, mut receiver) = mpsc::unbounded_channel::<EventEnvelope>();

        {
            let mut bindings = lock(&self.exchange.bindings);
            if bindings.iter().any(|b| b.queue == queue) {
                return Err(EventBusError::Subscribe(format!(
                    "queue '{}' is already bound",
                    queue
                )));
            }
            bindings.push(Binding {
                queue: queue.clone(),
                pattern,
                sender,
            });
        }

        let policy = self.exchange.policy.clone();
        let dead_letters = self.exchange.dead_letters.clone();
        let in_flight = self.exchange.in_flight.clone();
        let task_queue = queue.clone();

        tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                let outcome =
                    deliver_with_retry(&task_queue, handler.as_ref(), &envelope, &policy).await;
                if let DeliveryOutcome::DeadLettered(dead) = outcome {
                    lock(&dead_letters).push(dead);
                }
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        });

        info!(queue = %queue, "Queue bound to in-memory exchange");
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
