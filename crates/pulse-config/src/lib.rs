// ============================================================================
// Pulse Config - Centralized configuration management
// ============================================================================
//
// Every service loads the same `Config` and reads the sections it needs.
// Values come from the environment (and an optional `.env` file) with
// defaults suitable for local development.
//
// ============================================================================

mod cache;
mod constants;
mod database;
mod events;
mod logging;
mod media;
mod outbox;
mod security;
mod services;

pub use cache::CacheConfig;
pub use constants::{MAX_MEDIA_FILE_SIZE, SECONDS_PER_DAY, SECONDS_PER_MINUTE};
pub use database::DbConfig;
pub use events::EventsConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use media::MediaConfig;
pub use outbox::OutboxConfig;
pub use security::SecurityConfig;
pub use services::{CircuitBreakerConfig, ServicesConfig};

use anyhow::{Context, Result};
use std::str::FromStr;

/// Main configuration structure for Pulse services
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Postgres URL; required by identity, post, media and search
    pub database_url: Option<String>,
    /// Redis URL; required by the gateway and the post service
    pub redis_url: Option<String>,

    /// Explicit `PORT`, otherwise each binary uses its own default
    pub port: Option<u16>,
    pub bind_host: String,
    pub rust_log: String,

    // Sub-configurations
    pub db: DbConfig,
    pub cache: CacheConfig,
    pub events: EventsConfig,
    pub security: SecurityConfig,
    pub media: MediaConfig,
    pub services: ServicesConfig,
    pub outbox: OutboxConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            redis_url: std::env::var("REDIS_URL").ok(),
            port: std::env::var("PORT").ok().and_then(|p| p.parse().ok()),
            bind_host: std::env::var("BIND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            db: DbConfig::from_env(),
            cache: CacheConfig::from_env(),
            events: EventsConfig::from_env(),
            security: SecurityConfig::from_env()?,
            media: MediaConfig::from_env(),
            services: ServicesConfig::from_env(),
            outbox: OutboxConfig::from_env(),
            logging: LoggingConfig::from_env(),
        })
    }

    /// Socket address to bind, falling back to the service's default port
    pub fn bind_address(&self, default_port: u16) -> String {
        format!(
            "{}:{}",
            self.bind_host,
            self.port.unwrap_or(default_port)
        )
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set")
    }

    pub fn require_redis_url(&self) -> Result<&str> {
        self.redis_url.as_deref().context("REDIS_URL must be set")
    }
}

/// Parse an environment variable, falling back to `default` when it is
/// missing or malformed.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_uses_default_for_missing_and_malformed() {
        assert_eq!(env_or("PULSE_TEST_UNSET_VALUE", 42u32), 42);

        std::env::set_var("PULSE_TEST_MALFORMED_VALUE", "not-a-number");
        assert_eq!(env_or("PULSE_TEST_MALFORMED_VALUE", 7u64), 7);

        std::env::set_var("PULSE_TEST_PARSED_VALUE", " 15 ");
        assert_eq!(env_or("PULSE_TEST_PARSED_VALUE", 7u64), 15);
    }

    #[test]
    fn test_cache_defaults_match_key_families() {
        let cache = CacheConfig::default();
        assert_eq!(cache.post_ttl_secs, 36_000);
        assert_eq!(cache.listing_ttl_secs, 300);
    }

    #[test]
    fn test_bind_address_prefers_explicit_port() {
        let mut config = Config {
            bind_host: "0.0.0.0".to_string(),
            ..Default::default()
        };
        assert_eq!(config.bind_address(3002), "0.0.0.0:3002");

        config.port = Some(9000);
        assert_eq!(config.bind_address(3002), "0.0.0.0:9000");
    }

    #[test]
    fn test_dlq_topic_follows_exchange() {
        let events = EventsConfig::default();
        assert_eq!(events.dlq_topic(), "social_events-dlq");
    }

    #[test]
    fn test_token_ttls_in_seconds() {
        let security = SecurityConfig::default();
        assert_eq!(security.access_token_ttl_secs(), 3600);
        assert_eq!(security.refresh_token_ttl_secs(), 7 * 86400);
        assert_eq!(security.rate_limit_max_requests, 100);
        assert_eq!(security.rate_limit_window_secs, 900);
    }

    #[test]
    fn test_missing_urls_are_reported() {
        let config = Config::default();
        assert!(config.require_database_url().is_err());
        assert!(config.require_redis_url().is_err());
    }
}
