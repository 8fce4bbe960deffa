//! Prometheus exposition shared by every service

use anyhow::Result;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

/// HTTP responses by service, route prefix and status class
pub static HTTP_RESPONSES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pulse_http_responses_total",
        "Total number of HTTP responses",
        &["service", "status"]
    )
    .expect("Failed to register pulse_http_responses_total metric")
});

/// Record one response for `service`
pub fn record_response(service: &str, status: StatusCode) {
    let class = match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    };
    HTTP_RESPONSES_TOTAL.with_label_values(&[service, class]).inc();
}

/// Gather all registered metrics and encode them in Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// `GET /metrics`
pub async fn metrics_handler() -> Response {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_responses_are_exported() {
        record_response("test-service", StatusCode::CREATED);
        record_response("test-service", StatusCode::NOT_FOUND);

        let text = gather_metrics().unwrap();
        assert!(text.contains("pulse_http_responses_total"));
        assert!(text.contains("test-service"));
    }
}
