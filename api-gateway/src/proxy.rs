// ============================================================================
// Service Client
// ============================================================================
//
// Forwards gateway requests to backend services:
// - method, query, headers and body are passed on
// - x-user-id / x-internal-token are always set by the gateway, never by
//   the client
// - non-multipart bodies are labelled application/json
// - the backend's status, headers and body are streamed back; hop-by-hop
//   headers are dropped in both directions
//
// Unreachable backends and open circuits surface as a generic 500.
//
// ============================================================================

use std::time::Duration;

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use chrono::Utc;
use pulse_config::{CircuitBreakerConfig, ServicesConfig};
use pulse_error::{AppError, AppResult};
use pulse_server_shared::{INTERNAL_TOKEN_HEADER, REQUEST_ID_HEADER, USER_ID_HEADER};
use uuid::Uuid;

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::metrics;
use crate::middleware::AuthenticatedUser;
use crate::routing::{self, Backend, Route};
use crate::GatewayState;

const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Headers only the gateway may set on upstream requests
const GATEWAY_OWNED_HEADERS: [&str; 3] = [USER_ID_HEADER, INTERNAL_TOKEN_HEADER, REQUEST_ID_HEADER];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("multipart/"))
        .unwrap_or(false)
}

/// Identity headers attached to an authenticated request
#[derive(Debug, Clone)]
pub struct ForwardedIdentity {
    pub user_id: Uuid,
    pub internal_token: Option<String>,
}

struct Breakers {
    identity: CircuitBreaker,
    post: CircuitBreaker,
    media: CircuitBreaker,
    search: CircuitBreaker,
}

impl Breakers {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            identity: CircuitBreaker::new(Backend::Identity.name(), config.clone()),
            post: CircuitBreaker::new(Backend::Post.name(), config.clone()),
            media: CircuitBreaker::new(Backend::Media.name(), config.clone()),
            search: CircuitBreaker::new(Backend::Search.name(), config.clone()),
        }
    }

    fn get(&self, backend: Backend) -> &CircuitBreaker {
        match backend {
            Backend::Identity => &self.identity,
            Backend::Post => &self.post,
            Backend::Media => &self.media,
            Backend::Search => &self.search,
        }
    }
}

/// HTTP client for forwarding requests to backend services
pub struct ServiceClient {
    client: reqwest::Client,
    breakers: Breakers,
    max_body_bytes: usize,
}

impl ServiceClient {
    pub fn new(config: &ServicesConfig, max_body_bytes: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.service_timeout_secs))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            breakers: Breakers::new(&config.circuit_breaker),
            max_body_bytes,
        })
    }

    pub fn circuit_state(&self, backend: Backend) -> CircuitState {
        self.breakers.get(backend).state()
    }

    /// Forward `request` to `route` on the backend at `base_url`
    pub async fn forward(
        &self,
        route: &Route,
        base_url: &str,
        request: Request,
        identity: Option<ForwardedIdentity>,
    ) -> AppResult<Response> {
        let service = route.backend.name();
        let breaker = self.breakers.get(route.backend);

        if let Err(e) = breaker.allow_request() {
            metrics::UPSTREAM_FAILURES_TOTAL
                .with_label_values(&[service, "circuit_open"])
                .inc();
            return Err(AppError::upstream(format!("{}: {}", service, e)));
        }

        let (parts, body) = request.into_parts();
        let target_url = match parts.uri.query() {
            Some(query) => format!("{}{}?{}", base_url, route.upstream_path, query),
            None => format!("{}{}", base_url, route.upstream_path),
        };

        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let body = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, service, "Failed to read request body");
                AppError::validation("Request body too large")
            })?;

        let headers = upstream_headers(&parts.headers, identity.as_ref(), &request_id);

        tracing::debug!(
            service,
            method = %parts.method,
            path = %route.upstream_path,
            request_id = %request_id,
            "Proxying request"
        );

        let upstream = match self
            .client
            .request(parts.method, &target_url)
            .headers(headers)
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                breaker.record_failure();
                metrics::UPSTREAM_FAILURES_TOTAL
                    .with_label_values(&[service, "unreachable"])
                    .inc();
                tracing::error!(
                    error = %e,
                    service,
                    target_url = %target_url,
                    request_id = %request_id,
                    "Failed to forward request to service"
                );
                return Err(AppError::upstream(format!("{}: {}", service, e)));
            }
        };

        let status = upstream.status();
        if status.is_server_error() {
            breaker.record_failure();
        } else {
            breaker.record_success();
        }

        let mut response = Response::builder().status(status);
        if let Some(headers) = response.headers_mut() {
            for (name, value) in upstream.headers() {
                if !is_hop_by_hop(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                headers.insert(REQUEST_ID_HEADER, value);
            }
        }

        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| AppError::internal(format!("Failed to build proxied response: {}", e)))
    }
}

fn upstream_headers(
    incoming: &HeaderMap,
    identity: Option<&ForwardedIdentity>,
    request_id: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len() + 3);
    for (name, value) in incoming {
        if is_hop_by_hop(name)
            || *name == header::HOST
            || *name == header::CONTENT_LENGTH
            || GATEWAY_OWNED_HEADERS.contains(&name.as_str())
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if !is_multipart(incoming) {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }

    if let Some(identity) = identity {
        if let Ok(value) = HeaderValue::from_str(&identity.user_id.to_string()) {
            headers.insert(USER_ID_HEADER, value);
        }
        if let Some(token) = &identity.internal_token {
            if let Ok(value) = HeaderValue::from_str(token) {
                headers.insert(INTERNAL_TOKEN_HEADER, value);
            }
        }
    }

    headers
}

/// Catch-all handler behind the gateway middleware
pub async fn proxy_request(State(state): State<GatewayState>, request: Request) -> AppResult<Response> {
    let Some(route) = routing::resolve(request.uri().path()) else {
        tracing::debug!(path = %request.uri().path(), "No backend for path");
        return Err(AppError::not_found("Route"));
    };

    let user = request.extensions().get::<AuthenticatedUser>().copied();
    if route.backend.requires_auth() && user.is_none() {
        return Err(AppError::Unauthenticated);
    }

    let identity = user.map(|AuthenticatedUser(user_id)| ForwardedIdentity {
        user_id,
        internal_token: state
            .internal_signer
            .as_ref()
            .map(|signer| signer.sign(&user_id, Utc::now().timestamp())),
    });

    state
        .client
        .forward(&route, state.upstreams.url(route.backend), request, identity)
        .await
}
