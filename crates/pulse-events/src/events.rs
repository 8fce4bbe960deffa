//! Routing keys and payloads exchanged between services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const POST_CREATED: &str = "post.created";
pub const POST_DELETED: &str = "post.deleted";

/// Emitted by the post service after a post is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreated {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Emitted by the post service after a post is removed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDeleted {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub media_ids: Vec<Uuid>,
}
