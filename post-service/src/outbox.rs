// ============================================================================
// Outbox Dispatcher
// ============================================================================
//
// Post mutations commit an `outbox_events` row in the same transaction; this
// task moves those rows onto the event bus. A row is marked published only
// after the broker acknowledged it, so events survive crashes between the
// commit and the publish. Delivery is at-least-once: a crash after the ack
// but before the mark republishes the row under the same event id.
//
// Rows are published oldest first and a batch stops at the first failure,
// keeping `post.created` ahead of `post.deleted` for the same post.
//
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use pulse_config::OutboxConfig;
use pulse_db::DbPool;
use pulse_error::AppResult;
use pulse_events::{EventBus, EventEnvelope, PostCreated, PostDeleted, SharedEventBus};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::{self, Duration};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::store::Post;

/// An event waiting in the outbox
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub routing_key: String,
    pub payload: Value,
}

pub fn post_created_event(post: &Post) -> OutboxEvent {
    let payload = PostCreated {
        post_id: post.id,
        user_id: post.user_id,
        content: post.content.clone(),
        created_at: post.created_at,
    };
    OutboxEvent {
        id: Uuid::new_v4(),
        routing_key: pulse_events::POST_CREATED.to_string(),
        payload: serde_json::to_value(payload).unwrap_or(Value::Null),
    }
}

pub fn post_deleted_event(post: &Post) -> OutboxEvent {
    let payload = PostDeleted {
        post_id: post.id,
        user_id: post.user_id,
        media_ids: post.media_ids.clone(),
    };
    OutboxEvent {
        id: Uuid::new_v4(),
        routing_key: pulse_events::POST_DELETED.to_string(),
        payload: serde_json::to_value(payload).unwrap_or(Value::Null),
    }
}

/// Result of one dispatch pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutboxBatch {
    pub published: usize,
    pub failed: usize,
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Claim up to `batch_size` unpublished events, publish them in order and
    /// record each outcome.
    async fn publish_pending(&self, bus: &dyn EventBus, batch_size: i64)
        -> AppResult<OutboxBatch>;
}

pub struct PgOutboxStore {
    pool: DbPool,
}

impl PgOutboxStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn publish_pending(
        &self,
        bus: &dyn EventBus,
        batch_size: i64,
    ) -> AppResult<OutboxBatch> {
        let mut tx = self.pool.begin().await?;

        // Row locks keep other replicas off these rows until commit
        let events = sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT id, routing_key, payload
            FROM outbox_events
            WHERE published_at IS NULL
            ORDER BY created_at
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .await?;

        let mut batch = OutboxBatch::default();
        for event in events {
            let envelope = EventEnvelope::with_id(event.id, &event.routing_key, event.payload);
            match bus.publish_confirmed(envelope).await {
                Ok(()) => {
                    sqlx::query(
                        r#"
                        UPDATE outbox_events
                        SET published_at = NOW(), attempts = attempts + 1, last_error = NULL
                        WHERE id = $1
                        "#,
                    )
                    .bind(event.id)
                    .execute(&mut *tx)
                    .await?;
                    batch.published += 1;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        event_id = %event.id,
                        routing_key = %event.routing_key,
                        "Outbox publish failed, will retry on next poll"
                    );
                    sqlx::query(
                        r#"
                        UPDATE outbox_events
                        SET attempts = attempts + 1, last_error = $2
                        WHERE id = $1
                        "#,
                    )
                    .bind(event.id)
                    .bind(e.to_string())
                    .execute(&mut *tx)
                    .await?;
                    batch.failed += 1;
                    break;
                }
            }
        }

        tx.commit().await?;
        Ok(batch)
    }
}

/// Background task draining the outbox onto the event bus
pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxStore>,
    bus: SharedEventBus,
    notify: Arc<Notify>,
    config: OutboxConfig,
}

impl OutboxDispatcher {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        bus: SharedEventBus,
        notify: Arc<Notify>,
        config: OutboxConfig,
    ) -> Self {
        Self {
            outbox,
            bus,
            notify,
            config,
        }
    }

    /// Publish until the outbox is empty or a publish fails.
    /// Returns the number of events published.
    pub async fn dispatch_pending(&self) -> AppResult<usize> {
        let batch_size = self.config.batch_size.max(1);
        let mut total = 0;

        loop {
            let batch = self
                .outbox
                .publish_pending(self.bus.as_ref(), batch_size)
                .await?;
            total += batch.published;

            if batch.failed > 0 || (batch.published as i64) < batch_size {
                break;
            }
        }

        if total > 0 {
            debug!(published = total, "Outbox drained");
        }
        Ok(total)
    }

    /// Run forever: every poll interval, and whenever a write calls
    /// `notify_one` on the shared `Notify`.
    pub async fn run(self) {
        let mut interval = time::interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.notify.notified() => {}
            }

            if let Err(e) = self.dispatch_pending().await {
                error!(error = %e, "Outbox dispatch failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryPostStore, PostStore};
    use pulse_events::{EventBusError, EventHandler, InMemoryEventBus, RetryPolicy};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Bus that refuses publishes while `down` is set
    struct FlakyBus {
        inner: InMemoryEventBus,
        down: AtomicBool,
    }

    #[async_trait]
    impl EventBus for FlakyBus {
        async fn connect(&self) -> Result<(), EventBusError> {
            self.inner.connect().await
        }

        async fn publish_envelope(&self, envelope: EventEnvelope) -> Result<(), EventBusError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(EventBusError::Publish("broker unavailable".to_string()));
            }
            self.inner.publish_envelope(envelope).await
        }

        async fn subscribe(
            &self,
            pattern: &str,
            handler: Arc<dyn EventHandler>,
        ) -> Result<(), EventBusError> {
            self.inner.subscribe(pattern, handler).await
        }
    }

    fn dispatcher(store: Arc<InMemoryPostStore>, bus: SharedEventBus) -> OutboxDispatcher {
        OutboxDispatcher::new(
            store,
            bus,
            Arc::new(Notify::new()),
            OutboxConfig {
                poll_interval_ms: 10,
                batch_size: 2,
            },
        )
    }

    #[tokio::test]
    async fn test_dispatch_publishes_in_order_across_batches() {
        let store = Arc::new(InMemoryPostStore::new());
        let bus = InMemoryEventBus::new("post-service", RetryPolicy::immediate(0));
        let author = Uuid::new_v4();

        let first = Post::new(author, "first".to_string(), vec![]);
        let second = Post::new(author, "second".to_string(), vec![]);
        store.create_with_outbox(&first).await.unwrap();
        store.create_with_outbox(&second).await.unwrap();
        store
            .delete_owned_with_outbox(first.id, author)
            .await
            .unwrap()
            .unwrap();

        let published = dispatcher(store.clone(), Arc::new(bus.clone()))
            .dispatch_pending()
            .await
            .unwrap();
        assert_eq!(published, 3);
        assert_eq!(store.unpublished_count(), 0);

        let keys: Vec<String> = bus.published().into_iter().map(|e| e.routing_key).collect();
        assert_eq!(keys, vec!["post.created", "post.created", "post.deleted"]);

        let created: PostCreated = bus.published()[0].payload_as().unwrap();
        assert_eq!(created.post_id, first.id);
    }

    #[tokio::test]
    async fn test_failed_publish_is_recorded_and_retried() {
        let store = Arc::new(InMemoryPostStore::new());
        let inner = InMemoryEventBus::new("post-service", RetryPolicy::immediate(0));
        let bus = Arc::new(FlakyBus {
            inner: inner.clone(),
            down: AtomicBool::new(true),
        });

        let post = Post::new(Uuid::new_v4(), "hello".to_string(), vec![]);
        store.create_with_outbox(&post).await.unwrap();

        let dispatcher = dispatcher(store.clone(), bus.clone());
        assert_eq!(dispatcher.dispatch_pending().await.unwrap(), 0);

        let (attempts, last_error) = store.oldest_pending().unwrap();
        assert_eq!(attempts, 1);
        assert!(last_error.unwrap().contains("broker unavailable"));

        bus.down.store(false, Ordering::SeqCst);
        assert_eq!(dispatcher.dispatch_pending().await.unwrap(), 1);
        assert_eq!(store.unpublished_count(), 0);
        assert_eq!(inner.published().len(), 1);
    }

    #[test]
    fn test_event_payload_shapes() {
        let post = Post::new(Uuid::new_v4(), "hi".to_string(), vec![Uuid::new_v4()]);

        let created = post_created_event(&post);
        assert_eq!(created.routing_key, "post.created");
        assert_eq!(created.payload["content"], "hi");
        assert!(created.payload.get("createdAt").is_some());

        let deleted = post_deleted_event(&post);
        assert_eq!(deleted.routing_key, "post.deleted");
        assert_eq!(deleted.payload["mediaIds"].as_array().unwrap().len(), 1);
    }
}
