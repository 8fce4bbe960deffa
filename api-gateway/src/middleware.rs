// ============================================================================
// Gateway Middleware
// ============================================================================
//
// Applied outermost first:
// 1. rate_limit: per-IP sliding window, 429 when exceeded
// 2. require_auth: bearer token check on protected prefixes
//
// ============================================================================

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use pulse_error::AppError;
use pulse_server_shared::utils::{extract_client_ip, log_safe_id, log_user_id};
use uuid::Uuid;

use crate::metrics;
use crate::routing;
use crate::GatewayState;

/// Caller identity established from a verified access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

pub async fn rate_limit(State(state): State<GatewayState>, request: Request, next: Next) -> Response {
    let direct_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client_ip = extract_client_ip(request.headers(), direct_ip, state.trust_proxy_headers);

    match state.limiter.check(&client_ip).await {
        Ok(true) => {}
        Ok(false) => {
            metrics::RATE_LIMITED_TOTAL.inc();
            tracing::warn!(
                client = %log_safe_id(&client_ip, &state.logging.hash_salt),
                path = %request.uri().path(),
                "Rate limit exceeded"
            );
            return AppError::TooManyRequests.into_response();
        }
        Err(e) => {
            metrics::RATE_LIMITER_ERRORS_TOTAL.inc();
            tracing::warn!(error = %e, "Rate limiter unavailable, letting request through");
        }
    }

    next.run(request).await
}

pub async fn require_auth(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let protected = routing::resolve(request.uri().path())
        .map(|route| route.backend.requires_auth())
        .unwrap_or(false);
    if !protected {
        return Ok(next.run(request).await);
    }

    let token = bearer_token(request.headers()).ok_or_else(|| {
        tracing::warn!(path = %request.uri().path(), "Access attempt without bearer token");
        AppError::Unauthenticated
    })?;

    let claims = state.tokens.verify_token(token).map_err(|e| {
        tracing::warn!(error = %e, "Rejected access token");
        AppError::InvalidToken
    })?;
    let user_id = claims.user_id().ok_or_else(|| {
        tracing::warn!("Access token subject is not a user id");
        AppError::InvalidToken
    })?;

    tracing::debug!(user = %log_user_id(&state.logging, &user_id), "Request authenticated");
    request.extensions_mut().insert(AuthenticatedUser(user_id));
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
