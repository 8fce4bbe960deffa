// ============================================================================
// Media Metadata Store
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_db::DbPool;
use pulse_error::AppResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: Uuid,
    /// Object store key; absent on records that never reached the store
    pub store_key: Option<String>,
    pub original_name: String,
    pub mime_type: String,
    pub url: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn insert(&self, media: &Media) -> AppResult<()>;

    async fn list_all(&self) -> AppResult<Vec<Media>>;

    async fn find_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Media>>;

    async fn find_by_store_key(&self, key: &str) -> AppResult<Option<Media>>;

    /// Returns whether a row was removed
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
}

pub struct PgMediaStore {
    pool: DbPool,
}

impl PgMediaStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaStore for PgMediaStore {
    async fn insert(&self, media: &Media) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO media (id, store_key, original_name, mime_type, url, user_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(media.id)
        .bind(&media.store_key)
        .bind(&media.original_name)
        .bind(&media.mime_type)
        .bind(&media.url)
        .bind(media.user_id)
        .bind(media.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_all(&self) -> AppResult<Vec<Media>> {
        let media = sqlx::query_as::<_, Media>(
            r#"
            SELECT id, store_key, original_name, mime_type, url, user_id, created_at
            FROM media
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(media)
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Media>> {
        let media = sqlx::query_as::<_, Media>(
            r#"
            SELECT id, store_key, original_name, mime_type, url, user_id, created_at
            FROM media
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(media)
    }

    async fn find_by_store_key(&self, key: &str) -> AppResult<Option<Media>> {
        let media = sqlx::query_as::<_, Media>(
            r#"
            SELECT id, store_key, original_name, mime_type, url, user_id, created_at
            FROM media
            WHERE store_key = $1
            LIMIT 1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(media)
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM media WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryMediaStore;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use pulse_error::AppError;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryMediaStore {
        media: Mutex<Vec<Media>>,
        fail_inserts: AtomicBool,
    }

    impl InMemoryMediaStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.media.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        pub fn set_fail_inserts(&self, fail: bool) {
            self.fail_inserts.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl MediaStore for InMemoryMediaStore {
        async fn insert(&self, media: &Media) -> AppResult<()> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(AppError::internal("injected insert failure"));
            }
            self.media.lock().unwrap().push(media.clone());
            Ok(())
        }

        async fn list_all(&self) -> AppResult<Vec<Media>> {
            let mut media = self.media.lock().unwrap().clone();
            media.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(media)
        }

        async fn find_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Media>> {
            let media = self.media.lock().unwrap();
            Ok(media.iter().filter(|m| ids.contains(&m.id)).cloned().collect())
        }

        async fn find_by_store_key(&self, key: &str) -> AppResult<Option<Media>> {
            let media = self.media.lock().unwrap();
            Ok(media
                .iter()
                .find(|m| m.store_key.as_deref() == Some(key))
                .cloned())
        }

        async fn delete(&self, id: Uuid) -> AppResult<bool> {
            let mut media = self.media.lock().unwrap();
            let before = media.len();
            media.retain(|m| m.id != id);
            Ok(media.len() < before)
        }
    }
}
