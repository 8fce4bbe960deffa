// ============================================================================
// Post Cache
// ============================================================================
//
// Read-through cache for single posts (`post:{id}`) and listing pages
// (`posts:{page}:{limit}`). Values are the JSON bodies served to clients.
//
// ============================================================================

use async_trait::async_trait;
use pulse_error::AppResult;
use pulse_redis::RedisClient;
use uuid::Uuid;

/// Prefix shared by every listing page key
pub const LISTING_PREFIX: &str = "posts:";

pub fn post_key(post_id: &Uuid) -> String {
    format!("post:{}", post_id)
}

pub fn listing_key(page: u64, limit: u64) -> String {
    format!("{}{}:{}", LISTING_PREFIX, page, limit)
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Delete every key starting with `prefix`; returns how many were removed
    async fn delete_by_prefix(&self, prefix: &str) -> AppResult<u64>;
}

/// Drop the cached post and every cached listing page.
///
/// Failures are logged; the write that triggered invalidation has already
/// committed and stale entries expire with their TTL.
pub async fn invalidate_post(cache: &dyn Cache, post_id: &Uuid) {
    if let Err(e) = cache.delete(&post_key(post_id)).await {
        tracing::warn!(error = %e, post_id = %post_id, "Failed to invalidate cached post");
    }

    match cache.delete_by_prefix(LISTING_PREFIX).await {
        Ok(removed) => tracing::debug!(removed, "Invalidated cached post listings"),
        Err(e) => tracing::warn!(error = %e, "Failed to invalidate cached post listings"),
    }
}

pub struct RedisCache {
    client: RedisClient,
}

impl RedisCache {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut client = self.client.clone();
        Ok(client.get::<String>(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()> {
        let mut client = self.client.clone();
        client.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut client = self.client.clone();
        client.del(key).await?;
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> AppResult<u64> {
        let mut client = self.client.clone();
        Ok(client.delete_by_prefix(prefix).await?)
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryCache;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Cache without expiry; records the TTL each key was written with
    #[derive(Default)]
    pub struct InMemoryCache {
        entries: Mutex<HashMap<String, (String, u64)>>,
    }

    impl InMemoryCache {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn contains(&self, key: &str) -> bool {
            self.entries.lock().unwrap().contains_key(key)
        }

        pub fn ttl_of(&self, key: &str) -> Option<u64> {
            self.entries.lock().unwrap().get(key).map(|(_, ttl)| *ttl)
        }

        pub fn keys(&self) -> Vec<String> {
            self.entries.lock().unwrap().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl Cache for InMemoryCache {
        async fn get(&self, key: &str) -> AppResult<Option<String>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(key)
                .map(|(value, _)| value.clone()))
        }

        async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), (value.to_string(), ttl_secs));
            Ok(())
        }

        async fn delete(&self, key: &str) -> AppResult<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }

        async fn delete_by_prefix(&self, prefix: &str) -> AppResult<u64> {
            let mut entries = self.entries.lock().unwrap();
            let before = entries.len();
            entries.retain(|key, _| !key.starts_with(prefix));
            Ok((before - entries.len()) as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalidate_post_clears_item_and_all_listings() {
        let cache = InMemoryCache::new();
        let post_id = Uuid::new_v4();
        let other_id = Uuid::new_v4();

        cache.set(&post_key(&post_id), "{}", 36000).await.unwrap();
        cache.set(&post_key(&other_id), "{}", 36000).await.unwrap();
        cache.set(&listing_key(1, 10), "{}", 300).await.unwrap();
        cache.set(&listing_key(2, 5), "{}", 300).await.unwrap();

        invalidate_post(&cache, &post_id).await;

        assert!(!cache.contains(&post_key(&post_id)));
        assert!(cache.contains(&post_key(&other_id)));
        assert!(!cache.contains(&listing_key(1, 10)));
        assert!(!cache.contains(&listing_key(2, 5)));
    }

    #[test]
    fn test_key_shapes() {
        let id = Uuid::nil();
        assert_eq!(post_key(&id), format!("post:{}", id));
        assert_eq!(listing_key(3, 20), "posts:3:20");
    }
}
