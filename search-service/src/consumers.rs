// ============================================================================
// Event Consumers
// ============================================================================
//
// Keeps the index in step with the post service. Both handlers are
// idempotent: inserts ignore already indexed posts and deletes of unknown
// posts succeed.
//
// ============================================================================

use std::sync::Arc;

use anyhow::Result;
use pulse_events::{
    handler_fn, EventBus, EventEnvelope, PostCreated, POST_CREATED, POST_DELETED,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::store::{SearchDocument, SearchStore};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedPost {
    post_id: Uuid,
}

pub async fn register_consumers(bus: &dyn EventBus, store: Arc<dyn SearchStore>) -> Result<()> {
    let created_store = store.clone();
    bus.subscribe(
        POST_CREATED,
        handler_fn(move |event: EventEnvelope| {
            let store = created_store.clone();
            async move { handle_post_created(store.as_ref(), &event).await }
        }),
    )
    .await?;

    bus.subscribe(
        POST_DELETED,
        handler_fn(move |event: EventEnvelope| {
            let store = store.clone();
            async move { handle_post_deleted(store.as_ref(), &event).await }
        }),
    )
    .await?;

    Ok(())
}

pub async fn handle_post_created(store: &dyn SearchStore, event: &EventEnvelope) -> Result<()> {
    let payload: PostCreated = match event.payload_as() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, event_id = %event.event_id, "Invalid post.created event");
            return Ok(());
        }
    };

    if payload.content.trim().is_empty() {
        tracing::error!(post_id = %payload.post_id, "post.created event without content");
        return Ok(());
    }

    let inserted = store
        .insert_if_absent(&SearchDocument {
            post_id: payload.post_id,
            user_id: payload.user_id,
            content: payload.content,
            created_at: payload.created_at,
        })
        .await?;

    if inserted {
        tracing::info!(post_id = %payload.post_id, "Post indexed for search");
    } else {
        tracing::debug!(post_id = %payload.post_id, "Post already indexed");
    }
    Ok(())
}

pub async fn handle_post_deleted(store: &dyn SearchStore, event: &EventEnvelope) -> Result<()> {
    let payload: DeletedPost = match event.payload_as() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, event_id = %event.event_id, "Invalid post.deleted event");
            return Ok(());
        }
    };

    let removed = store.delete_by_post_id(payload.post_id).await?;
    tracing::info!(post_id = %payload.post_id, removed, "Post removed from search index");
    Ok(())
}
