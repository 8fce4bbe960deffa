// ============================================================================
// Search Index
// ============================================================================
//
// One row per post, keyed by post id. Ranking uses Postgres full-text search
// over an English `tsvector` generated from the content.
//
// Deletes leave a tombstone. `post.created` and `post.deleted` are consumed
// independently, so a create that is still being retried can arrive after
// the delete; tombstoned posts are never indexed again.
//
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_db::DbPool;
use pulse_error::AppResult;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchDocument {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub score: f32,
}

#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Index a document; returns false if the post was already indexed or
    /// has been deleted
    async fn insert_if_absent(&self, document: &SearchDocument) -> AppResult<bool>;

    /// Tombstone the post and drop its document; returns whether a document
    /// was removed
    async fn delete_by_post_id(&self, post_id: Uuid) -> AppResult<bool>;

    /// Best matches first
    async fn search(&self, query: &str, limit: i64) -> AppResult<Vec<SearchHit>>;
}

pub struct PgSearchStore {
    pool: DbPool,
}

impl PgSearchStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SearchStore for PgSearchStore {
    async fn insert_if_absent(&self, document: &SearchDocument) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO search_documents (post_id, user_id, content, created_at)
            SELECT $1::uuid, $2::uuid, $3::text, $4::timestamptz
            WHERE NOT EXISTS (SELECT 1 FROM search_tombstones WHERE post_id = $1::uuid)
            ON CONFLICT (post_id) DO NOTHING
            "#,
        )
        .bind(document.post_id)
        .bind(document.user_id)
        .bind(&document.content)
        .bind(document.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_post_id(&self, post_id: Uuid) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO search_tombstones (post_id) VALUES ($1) ON CONFLICT (post_id) DO NOTHING")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM search_documents WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn search(&self, query: &str, limit: i64) -> AppResult<Vec<SearchHit>> {
        let hits = sqlx::query_as::<_, SearchHit>(
            r#"
            SELECT post_id, user_id, content, created_at,
                   ts_rank(search_vector, plainto_tsquery('english', $1)) AS score
            FROM search_documents
            WHERE search_vector @@ plainto_tsquery('english', $1)
            ORDER BY score DESC, created_at DESC
            LIMIT $2
            "#,
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(hits)
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemorySearchStore;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    fn terms(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }

    /// Every query term must appear; score is the share of content words
    /// that match a query term.
    #[derive(Default)]
    pub struct InMemorySearchStore {
        documents: Mutex<Vec<SearchDocument>>,
        tombstones: Mutex<HashSet<Uuid>>,
    }

    impl InMemorySearchStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.documents.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl SearchStore for InMemorySearchStore {
        async fn insert_if_absent(&self, document: &SearchDocument) -> AppResult<bool> {
            let mut documents = self.documents.lock().unwrap();
            if self.tombstones.lock().unwrap().contains(&document.post_id)
                || documents.iter().any(|d| d.post_id == document.post_id)
            {
                return Ok(false);
            }
            documents.push(document.clone());
            Ok(true)
        }

        async fn delete_by_post_id(&self, post_id: Uuid) -> AppResult<bool> {
            let mut documents = self.documents.lock().unwrap();
            self.tombstones.lock().unwrap().insert(post_id);
            let before = documents.len();
            documents.retain(|d| d.post_id != post_id);
            Ok(documents.len() < before)
        }

        async fn search(&self, query: &str, limit: i64) -> AppResult<Vec<SearchHit>> {
            let wanted = terms(query);
            if wanted.is_empty() {
                return Ok(Vec::new());
            }

            let documents = self.documents.lock().unwrap();
            let mut hits: Vec<SearchHit> = documents
                .iter()
                .filter_map(|d| {
                    let words = terms(&d.content);
                    if !wanted.iter().all(|w| words.contains(w)) {
                        return None;
                    }
                    let matching = words.iter().filter(|w| wanted.contains(w)).count();
                    Some(SearchHit {
                        post_id: d.post_id,
                        user_id: d.user_id,
                        content: d.content.clone(),
                        created_at: d.created_at,
                        score: matching as f32 / words.len() as f32,
                    })
                })
                .collect();

            hits.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            });
            hits.truncate(limit.max(0) as usize);
            Ok(hits)
        }
    }
}
