// ============================================================================
// API Gateway
// ============================================================================
//
// Single entry point for all client requests. It handles:
// - Per-IP rate limiting (Redis sliding window)
// - Bearer token verification for posts, media and search
// - Routing `/v1/*` to the backend services under `/api/*`
// - Identity propagation (x-user-id, optional x-internal-token)
//
// Architecture:
// - Stateless apart from Redis, so it scales horizontally
// - One circuit breaker per backend
//
// ============================================================================

pub mod circuit_breaker;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod rate_limit;
pub mod routing;

use std::sync::Arc;

use axum::Router;
use pulse_config::LoggingConfig;
use pulse_server_shared::{InternalTokenSigner, TokenManager};

use crate::proxy::ServiceClient;
use crate::rate_limit::RateLimiter;
use crate::routing::Upstreams;

/// Gateway state shared by the middleware and the proxy handler
#[derive(Clone)]
pub struct GatewayState {
    pub upstreams: Arc<Upstreams>,
    pub client: Arc<ServiceClient>,
    pub tokens: Arc<TokenManager>,
    pub limiter: Arc<dyn RateLimiter>,
    /// Rate limit on proxy headers instead of the socket address
    pub trust_proxy_headers: bool,
    /// Signs x-internal-token when INTERNAL_AUTH_SECRET is set
    pub internal_signer: Option<Arc<InternalTokenSigner>>,
    pub logging: LoggingConfig,
}

/// Every path goes through rate limiting, then auth, then the proxy
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .fallback(proxy::proxy_request)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::{ConnectInfo, Request};
    use axum::http::{HeaderMap, StatusCode};
    use axum::Json;
    use http_body_util::BodyExt;
    use pulse_config::{CircuitBreakerConfig, ServicesConfig};
    use pulse_server_shared::{INTERNAL_TOKEN_HEADER, REQUEST_ID_HEADER, USER_ID_HEADER};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::rate_limit::InMemoryRateLimiter;
    use crate::routing::Backend;

    const SECRET: &str = "gateway-test-secret";

    /// Backend that answers with what it received
    async fn echo(request: Request) -> Json<Value> {
        let (parts, body) = request.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Json(json!({
            "method": parts.method.as_str(),
            "path": parts.uri.path(),
            "query": parts.uri.query(),
            "userId": header(USER_ID_HEADER),
            "internalToken": header(INTERNAL_TOKEN_HEADER),
            "requestId": header(REQUEST_ID_HEADER),
            "contentType": header("content-type"),
            "body": String::from_utf8_lossy(&bytes),
        }))
    }

    async fn spawn_echo_backend() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().fallback(echo))
                .await
                .unwrap();
        });
        format!("http://{}", addr)
    }

    /// An address nothing listens on
    async fn dead_backend() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    struct FailingLimiter;

    #[async_trait]
    impl RateLimiter for FailingLimiter {
        async fn check(&self, _client_ip: &str) -> anyhow::Result<bool> {
            anyhow::bail!("redis unavailable")
        }
    }

    struct Setup {
        backend_url: String,
        limiter: Arc<dyn RateLimiter>,
        signer: Option<InternalTokenSigner>,
        failure_threshold: u32,
        trust_proxy_headers: bool,
    }

    impl Setup {
        async fn echo() -> Self {
            Self {
                backend_url: spawn_echo_backend().await,
                limiter: Arc::new(InMemoryRateLimiter::new(Duration::from_secs(900), 100)),
                signer: None,
                failure_threshold: 5,
                trust_proxy_headers: false,
            }
        }

        fn build(self) -> (Router, Arc<ServiceClient>) {
            let services = ServicesConfig {
                identity_service_url: self.backend_url.clone(),
                post_service_url: self.backend_url.clone(),
                media_service_url: self.backend_url.clone(),
                search_service_url: self.backend_url,
                service_timeout_secs: 5,
                circuit_breaker: CircuitBreakerConfig {
                    failure_threshold: self.failure_threshold,
                    success_threshold: 2,
                    timeout_secs: 60,
                },
            };
            let client = Arc::new(ServiceClient::new(&services, 1024 * 1024).unwrap());
            let state = GatewayState {
                upstreams: Arc::new(Upstreams::from_config(&services)),
                client: client.clone(),
                tokens: Arc::new(TokenManager::from_secret(SECRET, 900, "pulse-test")),
                limiter: self.limiter,
                trust_proxy_headers: self.trust_proxy_headers,
                internal_signer: self.signer.map(Arc::new),
                logging: LoggingConfig::default(),
            };
            (router(state), client)
        }
    }

    fn access_token(user_id: &Uuid) -> String {
        TokenManager::from_secret(SECRET, 900, "pulse-test")
            .create_access_token(user_id)
            .unwrap()
            .token
    }

    async fn send(app: &Router, request: axum::http::Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> axum::http::request::Builder {
        axum::http::Request::builder().method("GET").uri(uri)
    }

    #[tokio::test]
    async fn test_auth_routes_are_public_and_rewritten() {
        let (app, _) = Setup::echo().await.build();

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/v1/auth/login")
            .header(USER_ID_HEADER, Uuid::new_v4().to_string())
            .header("content-type", "text/plain")
            .body(Body::from(r#"{"email":"a@b.co"}"#))
            .unwrap();
        let (status, headers, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["method"], "POST");
        assert_eq!(body["path"], "/api/auth/login");
        assert_eq!(body["userId"], Value::Null);
        assert_eq!(body["contentType"], "application/json");
        assert_eq!(body["body"], r#"{"email":"a@b.co"}"#);
        assert!(body["requestId"].is_string());
        assert_eq!(headers[REQUEST_ID_HEADER], body["requestId"].as_str().unwrap());
    }

    #[tokio::test]
    async fn test_protected_routes_require_valid_token() {
        let (app, _) = Setup::echo().await.build();

        let (status, _, body) = send(&app, get("/v1/posts/all-posts").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Authentication required! Please login to continue");

        let request = get("/v1/search/posts?query=hi")
            .header("authorization", "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Invalid token");

        let forged = TokenManager::from_secret("other-secret", 900, "pulse-test")
            .create_access_token(&Uuid::new_v4())
            .unwrap()
            .token;
        let request = get("/v1/media/get")
            .header("authorization", format!("Bearer {}", forged))
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_authenticated_request_carries_identity() {
        let (app, _) = Setup::echo().await.build();
        let user_id = Uuid::new_v4();

        let request = get("/v1/posts/all-posts?page=2&limit=5")
            .header("authorization", format!("Bearer {}", access_token(&user_id)))
            .header(USER_ID_HEADER, Uuid::new_v4().to_string())
            .header(REQUEST_ID_HEADER, "trace-123")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["path"], "/api/posts/all-posts");
        assert_eq!(body["query"], "page=2&limit=5");
        assert_eq!(body["userId"], user_id.to_string());
        assert_eq!(body["requestId"], "trace-123");
        assert_eq!(body["internalToken"], Value::Null);
        assert_eq!(headers[REQUEST_ID_HEADER], "trace-123");
    }

    #[tokio::test]
    async fn test_internal_token_is_signed_when_configured() {
        let mut setup = Setup::echo().await;
        setup.signer = Some(InternalTokenSigner::new("internal-secret", 60));
        let (app, _) = setup.build();
        let user_id = Uuid::new_v4();

        let request = get("/v1/media/get")
            .header("authorization", format!("Bearer {}", access_token(&user_id)))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let token = body["internalToken"].as_str().unwrap();
        let verifier = InternalTokenSigner::new("internal-secret", 60);
        let asserted = verifier
            .verify(token, chrono::Utc::now().timestamp())
            .unwrap();
        assert_eq!(asserted, user_id);
    }

    #[tokio::test]
    async fn test_multipart_uploads_keep_content_type() {
        let (app, _) = Setup::echo().await.build();

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/v1/media/upload")
            .header("authorization", format!("Bearer {}", access_token(&Uuid::new_v4())))
            .header("content-type", "multipart/form-data; boundary=abc")
            .body(Body::from("--abc--\r\n"))
            .unwrap();
        let (status, _, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["contentType"], "multipart/form-data; boundary=abc");
    }

    #[tokio::test]
    async fn test_unknown_prefix_is_not_found() {
        let (app, _) = Setup::echo().await.build();

        let (status, _, body) = send(&app, get("/v1/users/me").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _, _) = send(&app, get("/api/posts/all-posts").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Login request as it arrives from `socket`, with an optional
    /// client-supplied X-Forwarded-For
    fn login_from(socket: &str, forwarded_for: Option<&str>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri("/v1/auth/login");
        if let Some(ip) = forwarded_for {
            builder = builder.header("x-forwarded-for", ip);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        let addr: SocketAddr = format!("{}:40000", socket).parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    fn limited_to_two() -> Arc<dyn RateLimiter> {
        Arc::new(InMemoryRateLimiter::new(Duration::from_secs(900), 2))
    }

    #[tokio::test]
    async fn test_rate_limit_per_client_ip() {
        let mut setup = Setup::echo().await;
        setup.limiter = limited_to_two();
        let (app, _) = setup.build();

        assert_eq!(send(&app, login_from("10.0.0.1", None)).await.0, StatusCode::OK);
        assert_eq!(send(&app, login_from("10.0.0.1", None)).await.0, StatusCode::OK);
        let (status, _, body) = send(&app, login_from("10.0.0.1", None)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["success"], false);

        assert_eq!(send(&app, login_from("10.0.0.2", None)).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_does_not_bypass_limit() {
        let mut setup = Setup::echo().await;
        setup.limiter = limited_to_two();
        let (app, _) = setup.build();

        let mut limited = 0;
        for i in 0..20 {
            let spoofed = format!("198.51.100.{}", i);
            let (status, _, _) = send(&app, login_from("10.0.0.1", Some(&spoofed))).await;
            if status == StatusCode::TOO_MANY_REQUESTS {
                limited += 1;
            }
        }
        assert_eq!(limited, 18);
    }

    #[tokio::test]
    async fn test_forwarded_for_used_behind_trusted_proxy() {
        let mut setup = Setup::echo().await;
        setup.limiter = limited_to_two();
        setup.trust_proxy_headers = true;
        let (app, _) = setup.build();

        for _ in 0..2 {
            let (status, _, _) = send(&app, login_from("10.9.9.9", Some("203.0.113.5"))).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, _, _) = send(&app, login_from("10.9.9.9", Some("203.0.113.5"))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let (status, _, _) = send(&app, login_from("10.9.9.9", Some("203.0.113.6"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rate_limiter_failure_fails_open() {
        let mut setup = Setup::echo().await;
        setup.limiter = Arc::new(FailingLimiter);
        let (app, _) = setup.build();

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/v1/auth/register")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, request).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_generic_500_and_trips_breaker() {
        let mut setup = Setup::echo().await;
        setup.backend_url = dead_backend().await;
        setup.failure_threshold = 2;
        let (app, client) = setup.build();

        for _ in 0..3 {
            let request = axum::http::Request::builder()
                .method("POST")
                .uri("/v1/auth/login")
                .body(Body::empty())
                .unwrap();
            let (status, _, body) = send(&app, request).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, json!({"success": false, "message": "Internal server error"}));
        }

        assert_eq!(client.circuit_state(Backend::Identity), CircuitState::Open);
        assert_eq!(client.circuit_state(Backend::Post), CircuitState::Closed);
    }
}
