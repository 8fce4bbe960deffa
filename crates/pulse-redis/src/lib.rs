//! # Pulse Redis
//!
//! Low-level Redis client shared by the gateway (rate limiting) and the post
//! service (read-through cache).
//!
//! ## Design Principles
//!
//! - **No business logic** - key naming and TTL choices belong to callers
//! - **No dependencies** on other pulse-* crates
//!
//! ## Example
//!
//! ```rust,no_run
//! use pulse_redis::RedisClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = RedisClient::connect("redis://localhost:6379").await?;
//!
//!     client.set_ex("post:42", "{}", 3600).await?;
//!     let value: Option<String> = client.get("post:42").await?;
//!
//!     // Drop every listing page at once
//!     client.delete_by_prefix("posts:").await?;
//!     Ok(())
//! }
//! ```

mod client;
mod sliding_window;

pub use client::RedisClient;
pub use sliding_window::{SlidingWindowDecision, SlidingWindowLimiter};

// Re-export commonly used types
pub use redis::RedisError;

/// Result type for Redis operations
pub type Result<T> = std::result::Result<T, RedisError>;
