//! Sliding-window request counting over a Redis sorted set.
//!
//! Each hit is stored as a member scored by its timestamp in milliseconds.
//! Members older than the window are trimmed before counting, so the limit
//! applies to any window-length span rather than to fixed buckets.

use crate::{RedisClient, Result};

const SLIDING_WINDOW_SCRIPT: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, 0, now - window)
local count = redis.call('ZCARD', key)
if count >= limit then
    return {0, count}
end

redis.call('ZADD', key, now, member)
redis.call('PEXPIRE', key, window)
return {1, count + 1}
";

/// Outcome of recording one hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindowDecision {
    pub allowed: bool,
    /// Hits inside the window, including this one when allowed
    pub count: u64,
}

/// Limiter shared by every gateway replica through Redis
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    client: RedisClient,
    window_ms: u64,
    max_requests: u64,
    key_prefix: String,
}

impl SlidingWindowLimiter {
    pub fn new(client: RedisClient, window_secs: u64, max_requests: u64, key_prefix: &str) -> Self {
        Self {
            client,
            window_ms: window_secs * 1000,
            max_requests,
            key_prefix: key_prefix.to_string(),
        }
    }

    /// Record a hit for `subject` at `now_ms` and decide whether it is allowed.
    ///
    /// `hit_id` must be unique per request so concurrent hits in the same
    /// millisecond are counted separately.
    pub async fn hit(&self, subject: &str, now_ms: u64, hit_id: &str) -> Result<SlidingWindowDecision> {
        let key = self.key_for(subject);
        let mut client = self.client.clone();

        let (allowed, count): (i64, i64) = RedisClient::create_script(SLIDING_WINDOW_SCRIPT)
            .key(&key)
            .arg(now_ms)
            .arg(self.window_ms)
            .arg(self.max_requests)
            .arg(format!("{}-{}", now_ms, hit_id))
            .invoke_async(client.connection_mut())
            .await?;

        Ok(SlidingWindowDecision {
            allowed: allowed == 1,
            count: count.max(0) as u64,
        })
    }

    fn key_for(&self, subject: &str) -> String {
        // Normalize IP (handle IPv6 brackets if present)
        let normalized = subject.trim_start_matches('[').trim_end_matches(']');
        format!("{}{}", self.key_prefix, normalized)
    }
}
