// ============================================================================
// Search Service
// ============================================================================
//
// Handles:
// - Full-text queries over indexed posts
// - Index maintenance from `post.created` / `post.deleted` events
//
// ============================================================================

pub mod consumers;
pub mod core;
pub mod handlers;
pub mod store;

use std::sync::Arc;

use axum::{extract::FromRef, routing::get, Router};
use pulse_server_shared::InternalAuth;

use crate::store::SearchStore;

/// Search service context
#[derive(Clone)]
pub struct SearchContext {
    pub store: Arc<dyn SearchStore>,
    pub internal_auth: InternalAuth,
}

impl FromRef<SearchContext> for InternalAuth {
    fn from_ref(context: &SearchContext) -> Self {
        context.internal_auth.clone()
    }
}

/// Routes mounted under `/api/search`
pub fn router(context: SearchContext) -> Router {
    Router::new()
        .route("/api/search/posts", get(handlers::search_posts))
        .with_state(context)
}
