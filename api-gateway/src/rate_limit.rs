// ============================================================================
// Rate Limiting
// ============================================================================
//
// Global per-IP sliding window shared by every gateway replica through
// Redis (`rate:ip:{ip}`). The middleware lets requests through when the
// limiter itself fails.
//
// ============================================================================

use async_trait::async_trait;
use chrono::Utc;
use pulse_config::SecurityConfig;
use pulse_redis::{RedisClient, SlidingWindowLimiter};
use uuid::Uuid;

pub const RATE_LIMIT_KEY_PREFIX: &str = "rate:ip:";

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record one request from `client_ip`; false once the window is full
    async fn check(&self, client_ip: &str) -> anyhow::Result<bool>;
}

pub struct RedisRateLimiter {
    limiter: SlidingWindowLimiter,
}

impl RedisRateLimiter {
    pub fn new(client: RedisClient, config: &SecurityConfig) -> Self {
        Self {
            limiter: SlidingWindowLimiter::new(
                client,
                config.rate_limit_window_secs,
                config.rate_limit_max_requests,
                RATE_LIMIT_KEY_PREFIX,
            ),
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, client_ip: &str) -> anyhow::Result<bool> {
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        let decision = self
            .limiter
            .hit(client_ip, now_ms, &Uuid::new_v4().simple().to_string())
            .await?;

        tracing::trace!(count = decision.count, allowed = decision.allowed, "Rate limit hit recorded");
        Ok(decision.allowed)
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryRateLimiter;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use super::*;

    /// Process-local sliding window with the same semantics as the Redis one
    pub struct InMemoryRateLimiter {
        window: Duration,
        max_requests: usize,
        hits: Mutex<HashMap<String, VecDeque<Instant>>>,
    }

    impl InMemoryRateLimiter {
        pub fn new(window: Duration, max_requests: usize) -> Self {
            Self {
                window,
                max_requests,
                hits: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl RateLimiter for InMemoryRateLimiter {
        async fn check(&self, client_ip: &str) -> anyhow::Result<bool> {
            let now = Instant::now();
            let mut hits = self.hits.lock().unwrap();
            let window = hits.entry(client_ip.to_string()).or_default();

            while window
                .front()
                .is_some_and(|at| now.duration_since(*at) >= self.window)
            {
                window.pop_front();
            }
            if window.len() >= self.max_requests {
                return Ok(false);
            }
            window.push_back(now);
            Ok(true)
        }
    }
}
