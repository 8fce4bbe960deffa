// ============================================================================
// Security Configuration
// ============================================================================

use anyhow::{Context, Result};

use crate::constants::*;
use crate::env_or;

/// Token signing material, token lifetimes and gateway throttling
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// Shared HMAC secret for HS256 access tokens
    pub jwt_secret: Option<String>,
    /// RSA private key (PEM) for RS256 signing; identity service only
    pub jwt_private_key: Option<String>,
    /// RSA public key (PEM) for RS256 verification
    pub jwt_public_key: Option<String>,
    pub jwt_issuer: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    /// How often expired refresh tokens are purged
    pub refresh_token_sweep_interval_secs: u64,
    /// Sliding window length for the gateway IP limiter
    pub rate_limit_window_secs: u64,
    /// Requests allowed per IP inside one window
    pub rate_limit_max_requests: u64,
    /// Key the limiter on X-Forwarded-For / X-Real-IP instead of the socket
    /// address. Only safe behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
    /// When set, the gateway signs `x-user-id` and backends verify the signature
    pub internal_auth_secret: Option<String>,
    pub internal_token_ttl_secs: i64,
}

impl SecurityConfig {
    pub(crate) fn from_env() -> Result<Self> {
        Ok(Self {
            jwt_secret: non_empty_var("JWT_SECRET"),
            jwt_private_key: load_key_material("JWT_PRIVATE_KEY")?,
            jwt_public_key: load_key_material("JWT_PUBLIC_KEY")?,
            jwt_issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "pulse".to_string()),
            access_token_ttl_minutes: env_or(
                "ACCESS_TOKEN_TTL_MINUTES",
                DEFAULT_ACCESS_TOKEN_TTL_MINUTES,
            ),
            refresh_token_ttl_days: env_or("REFRESH_TOKEN_TTL_DAYS", DEFAULT_REFRESH_TOKEN_TTL_DAYS),
            refresh_token_sweep_interval_secs: env_or(
                "REFRESH_TOKEN_SWEEP_INTERVAL_SECS",
                DEFAULT_REFRESH_TOKEN_SWEEP_INTERVAL_SECS,
            ),
            rate_limit_window_secs: env_or("RATE_LIMIT_WINDOW_SECS", DEFAULT_RATE_LIMIT_WINDOW_SECS),
            rate_limit_max_requests: env_or(
                "RATE_LIMIT_MAX_REQUESTS",
                DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            ),
            trust_proxy_headers: env_or("TRUST_PROXY_HEADERS", false),
            internal_auth_secret: non_empty_var("INTERNAL_AUTH_SECRET"),
            internal_token_ttl_secs: env_or(
                "INTERNAL_TOKEN_TTL_SECS",
                DEFAULT_INTERNAL_TOKEN_TTL_SECS,
            ),
        })
    }

    /// Access token lifetime in seconds
    pub fn access_token_ttl_secs(&self) -> i64 {
        self.access_token_ttl_minutes * SECONDS_PER_MINUTE
    }

    /// Refresh token lifetime in seconds
    pub fn refresh_token_ttl_secs(&self) -> i64 {
        self.refresh_token_ttl_days * SECONDS_PER_DAY
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_private_key: None,
            jwt_public_key: None,
            jwt_issuer: "pulse".to_string(),
            access_token_ttl_minutes: DEFAULT_ACCESS_TOKEN_TTL_MINUTES,
            refresh_token_ttl_days: DEFAULT_REFRESH_TOKEN_TTL_DAYS,
            refresh_token_sweep_interval_secs: DEFAULT_REFRESH_TOKEN_SWEEP_INTERVAL_SECS,
            rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            trust_proxy_headers: false,
            internal_auth_secret: None,
            internal_token_ttl_secs: DEFAULT_INTERNAL_TOKEN_TTL_SECS,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Keys may be given inline as PEM or as a path to a PEM file.
fn load_key_material(key: &str) -> Result<Option<String>> {
    let Some(value) = non_empty_var(key) else {
        return Ok(None);
    };

    if value.starts_with("-----BEGIN") {
        return Ok(Some(value));
    }

    let pem = std::fs::read_to_string(&value)
        .with_context(|| format!("Failed to read {} from {}", key, value))?;
    Ok(Some(pem))
}
