// ============================================================================
// Cache Configuration
// ============================================================================

use crate::constants::{DEFAULT_LISTING_CACHE_TTL_SECS, DEFAULT_POST_CACHE_TTL_SECS};
use crate::env_or;

/// TTLs for the read-through post cache
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// TTL of `post:{id}` entries
    pub post_ttl_secs: u64,
    /// TTL of `posts:{page}:{limit}` listing entries
    pub listing_ttl_secs: u64,
}

impl CacheConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            post_ttl_secs: env_or("CACHE_POST_TTL_SECS", DEFAULT_POST_CACHE_TTL_SECS),
            listing_ttl_secs: env_or("CACHE_LISTING_TTL_SECS", DEFAULT_LISTING_CACHE_TTL_SECS),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            post_ttl_secs: DEFAULT_POST_CACHE_TTL_SECS,
            listing_ttl_secs: DEFAULT_LISTING_CACHE_TTL_SECS,
        }
    }
}
