use anyhow::{Context, Result};
use axum::{
    extract::Request, middleware::Next, response::IntoResponse, response::Response, routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::metrics::{metrics_handler, record_response};

/// Add `/health`, `/metrics`, request tracing and response counting
pub fn with_service_layers(router: Router, service: &'static str) -> Router {
    router
        .route(
            "/health",
            get(move || async move { health_check(service).await }),
        )
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(move |req: Request, next: Next| {
            count_responses(service, req, next)
        }))
        .layer(TraceLayer::new_for_http())
}

async fn health_check(service: &'static str) -> impl IntoResponse {
    Json(json!({"status": "ok", "service": service}))
}

async fn count_responses(service: &'static str, req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    record_response(service, response.status());
    response
}

/// Bind `address` and serve until Ctrl-C
pub async fn serve(router: Router, address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;
    info!("Listening on {}", address);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = with_service_layers(Router::new(), "unit-test");
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["service"], "unit-test");
    }
}
