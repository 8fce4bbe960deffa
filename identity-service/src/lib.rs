// ============================================================================
// Identity Service
// ============================================================================
//
// Handles:
// - User registration (Argon2 password hashing)
// - Login
// - Access token issue (JWT) and refresh-token rotation
// - Logout (refresh-token revocation)
// - Periodic purge of expired refresh tokens
//
// ============================================================================

pub mod core;
pub mod handlers;
pub mod store;
pub mod sweeper;
pub mod validation;

use std::sync::Arc;

use axum::{routing::post, Router};
use pulse_config::LoggingConfig;
use pulse_server_shared::TokenManager;

use crate::store::IdentityStore;

/// Identity service context
#[derive(Clone)]
pub struct IdentityContext {
    pub store: Arc<dyn IdentityStore>,
    pub tokens: Arc<TokenManager>,
    pub refresh_token_ttl_secs: i64,
    pub logging: LoggingConfig,
}

/// Routes mounted under `/api/auth`
pub fn router(context: IdentityContext) -> Router {
    Router::new()
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/refresh-token", post(handlers::refresh_token))
        .route("/api/auth/logout", post(handlers::logout))
        .with_state(context)
}
