// ============================================================================
// Configuration Constants
// ============================================================================

// Cache TTLs (seconds)
pub(crate) const DEFAULT_POST_CACHE_TTL_SECS: u64 = 36_000; // 10 hours
pub(crate) const DEFAULT_LISTING_CACHE_TTL_SECS: u64 = 300; // 5 minutes

// Token lifetimes
pub(crate) const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: i64 = 60;
pub(crate) const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 7;
pub(crate) const DEFAULT_REFRESH_TOKEN_SWEEP_INTERVAL_SECS: u64 = 3600;
pub(crate) const DEFAULT_INTERNAL_TOKEN_TTL_SECS: i64 = 60;

// Gateway rate limiting: 100 requests per 15 minutes per client IP
pub(crate) const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;
pub(crate) const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 100;

// Event bus
pub(crate) const DEFAULT_EVENT_EXCHANGE: &str = "social_events";
pub(crate) const DEFAULT_EVENT_MAX_RETRIES: u32 = 3;
pub(crate) const DEFAULT_EVENT_RETRY_BACKOFF_MS: u64 = 200;

// Outbox dispatcher
pub(crate) const DEFAULT_OUTBOX_POLL_INTERVAL_MS: u64 = 1000;
pub(crate) const DEFAULT_OUTBOX_BATCH_SIZE: i64 = 100;

// Time conversion constants
pub const SECONDS_PER_MINUTE: i64 = 60;
pub const SECONDS_PER_DAY: i64 = 86400;

/// Upload size cap for the media service
pub const MAX_MEDIA_FILE_SIZE: usize = 5 * 1024 * 1024; // 5 MB
