// ============================================================================
// Post Store
// ============================================================================
//
// Every mutation writes its outbox record in the same transaction, so an
// event exists if and only if the change it describes was committed.
//
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_db::DbPool;
use pulse_error::AppResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::outbox::{post_created_event, post_deleted_event, OutboxEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub media_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn new(user_id: Uuid, content: String, media_ids: Vec<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            content,
            media_ids,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Insert `post` together with its `post.created` outbox record
    async fn create_with_outbox(&self, post: &Post) -> AppResult<()>;

    /// Newest first
    async fn list(&self, offset: i64, limit: i64) -> AppResult<Vec<Post>>;

    async fn count(&self) -> AppResult<i64>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Post>>;

    /// Delete the post only if `user_id` owns it, writing its `post.deleted`
    /// outbox record in the same transaction. `None` when nothing matched.
    async fn delete_owned_with_outbox(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Post>>;
}

pub struct PgPostStore {
    pool: DbPool,
}

impl PgPostStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

async fn insert_outbox_event(
    conn: &mut sqlx::PgConnection,
    event: &OutboxEvent,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO outbox_events (id, routing_key, payload)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(event.id)
    .bind(&event.routing_key)
    .bind(&event.payload)
    .execute(conn)
    .await?;

    Ok(())
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn create_with_outbox(&self, post: &Post) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, user_id, content, media_ids, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(post.id)
        .bind(post.user_id)
        .bind(&post.content)
        .bind(&post.media_ids)
        .bind(post.created_at)
        .execute(&mut *tx)
        .await?;

        insert_outbox_event(&mut tx, &post_created_event(post)).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, offset: i64, limit: i64) -> AppResult<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, user_id, content, media_ids, created_at
            FROM posts
            ORDER BY created_at DESC
            OFFSET $1
            LIMIT $2
            "#,
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    async fn count(&self) -> AppResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, user_id, content, media_ids, created_at
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    async fn delete_owned_with_outbox(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Post>> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query_as::<_, Post>(
            r#"
            DELETE FROM posts
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, content, media_ids, created_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(post) = deleted else {
            tx.rollback().await?;
            return Ok(None);
        };

        insert_outbox_event(&mut tx, &post_deleted_event(&post)).await?;

        tx.commit().await?;
        Ok(Some(post))
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryPostStore;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::sync::Mutex;

    use pulse_events::{EventBus, EventEnvelope};

    use super::*;
    use crate::outbox::{OutboxBatch, OutboxStore};

    struct PendingEvent {
        event: OutboxEvent,
        published: bool,
        attempts: u32,
        last_error: Option<String>,
    }

    #[derive(Default)]
    struct State {
        posts: Vec<Post>,
        outbox: Vec<PendingEvent>,
    }

    /// Posts and outbox in one mutex, so "transactions" are trivially atomic
    #[derive(Default)]
    pub struct InMemoryPostStore {
        state: Mutex<State>,
    }

    impl InMemoryPostStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn unpublished_count(&self) -> usize {
            let state = self.state.lock().unwrap();
            state.outbox.iter().filter(|e| !e.published).count()
        }

        /// (attempts, last_error) of the oldest unpublished record
        pub fn oldest_pending(&self) -> Option<(u32, Option<String>)> {
            let state = self.state.lock().unwrap();
            state
                .outbox
                .iter()
                .find(|e| !e.published)
                .map(|e| (e.attempts, e.last_error.clone()))
        }
    }

    #[async_trait]
    impl PostStore for InMemoryPostStore {
        async fn create_with_outbox(&self, post: &Post) -> AppResult<()> {
            let mut state = self.state.lock().unwrap();
            state.posts.push(post.clone());
            state.outbox.push(PendingEvent {
                event: post_created_event(post),
                published: false,
                attempts: 0,
                last_error: None,
            });
            Ok(())
        }

        async fn list(&self, offset: i64, limit: i64) -> AppResult<Vec<Post>> {
            let state = self.state.lock().unwrap();
            let mut posts = state.posts.clone();
            posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(posts
                .into_iter()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .collect())
        }

        async fn count(&self) -> AppResult<i64> {
            Ok(self.state.lock().unwrap().posts.len() as i64)
        }

        async fn get(&self, id: Uuid) -> AppResult<Option<Post>> {
            let state = self.state.lock().unwrap();
            Ok(state.posts.iter().find(|p| p.id == id).cloned())
        }

        async fn delete_owned_with_outbox(
            &self,
            id: Uuid,
            user_id: Uuid,
        ) -> AppResult<Option<Post>> {
            let mut state = self.state.lock().unwrap();
            let Some(index) = state
                .posts
                .iter()
                .position(|p| p.id == id && p.user_id == user_id)
            else {
                return Ok(None);
            };

            let post = state.posts.remove(index);
            state.outbox.push(PendingEvent {
                event: post_deleted_event(&post),
                published: false,
                attempts: 0,
                last_error: None,
            });
            Ok(Some(post))
        }
    }

    #[async_trait]
    impl OutboxStore for InMemoryPostStore {
        async fn publish_pending(
            &self,
            bus: &dyn EventBus,
            batch_size: i64,
        ) -> AppResult<OutboxBatch> {
            let claimed: Vec<OutboxEvent> = {
                let state = self.state.lock().unwrap();
                state
                    .outbox
                    .iter()
                    .filter(|e| !e.published)
                    .take(batch_size.max(0) as usize)
                    .map(|e| e.event.clone())
                    .collect()
            };

            let mut batch = OutboxBatch::default();
            for event in claimed {
                let envelope =
                    EventEnvelope::with_id(event.id, &event.routing_key, event.payload.clone());
                let result = bus.publish_confirmed(envelope).await;

                let mut state = self.state.lock().unwrap();
                let Some(pending) = state.outbox.iter_mut().find(|e| e.event.id == event.id)
                else {
                    continue;
                };
                pending.attempts += 1;
                match result {
                    Ok(()) => {
                        pending.published = true;
                        batch.published += 1;
                    }
                    Err(e) => {
                        pending.last_error = Some(e.to_string());
                        batch.failed += 1;
                        break;
                    }
                }
            }

            Ok(batch)
        }
    }
}
