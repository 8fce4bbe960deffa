//! Gateway-specific Prometheus metrics, exposed through the shared `/metrics`

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

pub static RATE_LIMITED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pulse_gateway_rate_limited_total",
        "Requests rejected by the per-IP rate limit"
    )
    .expect("Failed to register pulse_gateway_rate_limited_total metric")
});

pub static RATE_LIMITER_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pulse_gateway_rate_limiter_errors_total",
        "Rate limiter failures (requests were let through)"
    )
    .expect("Failed to register pulse_gateway_rate_limiter_errors_total metric")
});

/// Proxy failures by backend and reason ("unreachable", "circuit_open")
pub static UPSTREAM_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pulse_gateway_upstream_failures_total",
        "Requests that could not be proxied to a backend",
        &["service", "reason"]
    )
    .expect("Failed to register pulse_gateway_upstream_failures_total metric")
});
