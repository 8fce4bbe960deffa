//! Redis client implementation with connection management

use crate::Result;
use redis::{aio::ConnectionManager, AsyncCommands};

/// Keys fetched per SCAN round trip during prefix deletion
const SCAN_BATCH: usize = 200;

/// Redis client with automatic reconnection
///
/// Cloning is cheap: all clones multiplex over the same connection.
#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    /// Connect to Redis server
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Mutable access to the connection manager (for scripts)
    pub fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.conn
    }

    // ============================================================================
    // Key-Value Operations
    // ============================================================================

    /// GET - Get value by key
    pub async fn get<T: redis::FromRedisValue>(&mut self, key: &str) -> Result<Option<T>> {
        self.conn.get(key).await
    }

    /// SETEX - Set key with expiry in seconds
    pub async fn set_ex(&mut self, key: &str, value: &str, seconds: u64) -> Result<()> {
        self.conn.set_ex(key, value, seconds).await
    }

    /// DEL - Delete one or more keys
    pub async fn del<K>(&mut self, keys: K) -> Result<i64>
    where
        K: redis::ToRedisArgs + Send + Sync,
    {
        self.conn.del(keys).await
    }

    // ============================================================================
    // Prefix Operations
    // ============================================================================

    /// Delete every key starting with `prefix`.
    ///
    /// Walks the keyspace with SCAN (never KEYS) and deletes each batch as it
    /// arrives. Returns the number of keys removed.
    pub async fn delete_by_prefix(&mut self, prefix: &str) -> Result<u64> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut self.conn)
                .await?;

            if !keys.is_empty() {
                let removed: i64 = self.conn.del(&keys).await?;
                deleted += removed.max(0) as u64;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(prefix = %prefix, deleted = deleted, "Deleted keys by prefix");
        Ok(deleted)
    }

    // ============================================================================
    // Lua Scripts
    // ============================================================================

    /// Build a Lua script handle
    pub fn create_script(code: &str) -> redis::Script {
        redis::Script::new(code)
    }
}

/// Escape glob metacharacters so the prefix is matched literally
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
