use std::net::IpAddr;

use pulse_config::LoggingConfig;
use sha2::{Digest, Sha256};

/// Produce a short, non-reversible identifier for logs.
///
/// Returns the first 8 hex chars of SHA256(salt || id).
pub fn log_safe_id(id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(id.as_bytes());
    let hash = hasher.finalize();

    hash[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Render a user id for logs: raw when `LOG_USER_IDENTIFIERS=true`,
/// otherwise the salted hash from [`log_safe_id`].
pub fn log_user_id(config: &LoggingConfig, user_id: &impl std::fmt::Display) -> String {
    let raw = user_id.to_string();
    if config.enable_user_identifiers {
        raw
    } else {
        log_safe_id(&raw, &config.hash_salt)
    }
}

/// Extract the client IP used for rate limiting.
///
/// The socket address is authoritative unless `trust_proxy_headers` is set,
/// in which case the first X-Forwarded-For entry wins, then X-Real-IP.
/// Falls back to "unknown".
pub fn extract_client_ip(
    headers: &axum::http::HeaderMap,
    direct_ip: Option<IpAddr>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(headers) {
            return ip.to_string();
        }
    }

    direct_ip
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(headers: &axum::http::HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<IpAddr>().ok())
        })
}
