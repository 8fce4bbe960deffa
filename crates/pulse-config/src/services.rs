// ============================================================================
// Backend Services Configuration
// ============================================================================

use crate::env_or;

/// Circuit breaker configuration for service resilience
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Failure threshold before opening circuit (default: 5)
    pub failure_threshold: u32,
    /// Success threshold to close circuit (default: 2)
    pub success_threshold: u32,
    /// Timeout in seconds before attempting to close circuit (default: 60)
    pub timeout_secs: u64,
}

impl CircuitBreakerConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            failure_threshold: env_or("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5),
            success_threshold: env_or("CIRCUIT_BREAKER_SUCCESS_THRESHOLD", 2),
            timeout_secs: env_or("CIRCUIT_BREAKER_TIMEOUT_SECS", 60),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_secs: 60,
        }
    }
}

/// Where the gateway finds each backend
#[derive(Clone, Debug)]
pub struct ServicesConfig {
    /// Identity Service URL (e.g., "http://identity-service:3001")
    pub identity_service_url: String,
    pub post_service_url: String,
    pub media_service_url: String,
    pub search_service_url: String,
    /// Timeout for proxied requests in seconds
    pub service_timeout_secs: u64,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl ServicesConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            identity_service_url: std::env::var("IDENTITY_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
            post_service_url: std::env::var("POST_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:3002".to_string()),
            media_service_url: std::env::var("MEDIA_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:3003".to_string()),
            search_service_url: std::env::var("SEARCH_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:3004".to_string()),
            service_timeout_secs: env_or("SERVICE_TIMEOUT_SECS", 30),
            circuit_breaker: CircuitBreakerConfig::from_env(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            identity_service_url: "http://localhost:3001".to_string(),
            post_service_url: "http://localhost:3002".to_string(),
            media_service_url: "http://localhost:3003".to_string(),
            search_service_url: "http://localhost:3004".to_string(),
            service_timeout_secs: 30,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}
