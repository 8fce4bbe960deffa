// ============================================================================
// Media Service
// ============================================================================
//
// Handles:
// - Multipart uploads into the object store, with metadata in Postgres
// - Listing media records
// - Serving locally stored objects
// - Removing a deleted post's media (`post.deleted` consumer)
//
// ============================================================================

pub mod consumers;
pub mod core;
pub mod handlers;
pub mod object_store;
pub mod store;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use pulse_config::LoggingConfig;
use pulse_server_shared::InternalAuth;

use crate::object_store::{LocalObjectStore, ObjectStore};
use crate::store::MediaStore;

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Media service context
#[derive(Clone)]
pub struct MediaContext {
    pub store: Arc<dyn MediaStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub max_file_size: usize,
    pub internal_auth: InternalAuth,
    pub logging: LoggingConfig,
}

impl FromRef<MediaContext> for InternalAuth {
    fn from_ref(context: &MediaContext) -> Self {
        context.internal_auth.clone()
    }
}

/// Routes mounted under `/api/media`
pub fn router(context: MediaContext) -> Router {
    let upload_limit = context.max_file_size + MULTIPART_OVERHEAD;

    Router::new()
        .route(
            "/api/media/upload",
            post(handlers::upload_media).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/media/get", get(handlers::list_media))
        .with_state(context)
}

/// State of the public file route
#[derive(Clone)]
pub struct FileContext {
    pub objects: Arc<LocalObjectStore>,
    /// Source of each file's content type
    pub store: Arc<dyn MediaStore>,
}

/// Public file route backing the URLs handed out by `LocalObjectStore`
pub fn file_router(objects: Arc<LocalObjectStore>, store: Arc<dyn MediaStore>) -> Router {
    Router::new()
        .route("/files/:kind/:id", get(handlers::serve_file))
        .with_state(FileContext { objects, store })
}
