// ============================================================================
// Post Service
// ============================================================================
//
// Handles:
// - Post creation and owner-only deletion
// - Paginated listing and single-post reads (Redis read-through cache)
// - `post.created` / `post.deleted` events via a transactional outbox
//
// ============================================================================

pub mod cache;
pub mod core;
pub mod handlers;
pub mod outbox;
pub mod store;

use std::sync::Arc;

use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use pulse_config::{CacheConfig, LoggingConfig};
use pulse_server_shared::InternalAuth;
use tokio::sync::Notify;

use crate::cache::Cache;
use crate::store::PostStore;

/// Post service context
#[derive(Clone)]
pub struct PostContext {
    pub store: Arc<dyn PostStore>,
    pub cache: Arc<dyn Cache>,
    pub cache_config: CacheConfig,
    /// Wakes the outbox dispatcher after a committed write
    pub outbox_notify: Arc<Notify>,
    pub internal_auth: InternalAuth,
    pub logging: LoggingConfig,
}

impl FromRef<PostContext> for InternalAuth {
    fn from_ref(context: &PostContext) -> Self {
        context.internal_auth.clone()
    }
}

/// Routes mounted under `/api/posts`
pub fn router(context: PostContext) -> Router {
    Router::new()
        .route("/api/posts/create-post", post(handlers::create_post))
        .route("/api/posts/all-posts", get(handlers::list_posts))
        .route(
            "/api/posts/:id",
            get(handlers::get_post).delete(handlers::delete_post),
        )
        .with_state(context)
}
