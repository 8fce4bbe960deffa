// ============================================================================
// Event Consumers
// ============================================================================
//
// `post.deleted` removes the media attached to the deleted post: object store
// first, then the metadata row, so a retry can always find what is left.
//
// ============================================================================

use std::sync::Arc;

use anyhow::Result;
use pulse_events::{handler_fn, EventBus, EventEnvelope, POST_DELETED};
use serde::Deserialize;
use uuid::Uuid;

use crate::MediaContext;

/// The part of a `post.deleted` payload this service needs
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedPostMedia {
    #[serde(default)]
    post_id: Option<String>,
    media_ids: Vec<Uuid>,
}

pub async fn register_consumers(bus: &dyn EventBus, context: MediaContext) -> Result<()> {
    let context = Arc::new(context);
    bus.subscribe(
        POST_DELETED,
        handler_fn(move |event: EventEnvelope| {
            let context = context.clone();
            async move { handle_post_deleted(&context, &event).await }
        }),
    )
    .await?;
    Ok(())
}

/// Remove every known media record listed in the event.
///
/// Malformed payloads are dropped. Per-item failures do not stop the loop;
/// if any occurred the whole event fails so the bus retries it.
pub async fn handle_post_deleted(context: &MediaContext, event: &EventEnvelope) -> Result<()> {
    let payload: DeletedPostMedia = match event.payload_as() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(
                error = %e,
                event_id = %event.event_id,
                "Invalid or missing mediaIds in post.deleted event"
            );
            return Ok(());
        }
    };
    let post_id = payload.post_id.unwrap_or_default();

    if payload.media_ids.is_empty() {
        tracing::debug!(post_id = %post_id, "Deleted post had no media");
        return Ok(());
    }

    let records = context.store.find_by_ids(&payload.media_ids).await?;
    let mut failures = 0usize;

    for media in records {
        let Some(key) = media.store_key.as_deref().filter(|k| !k.is_empty()) else {
            tracing::error!(media_id = %media.id, "Media record has no store key, skipping");
            continue;
        };

        if let Err(e) = context.objects.delete(key).await {
            tracing::error!(error = %e, media_id = %media.id, key = %key, "Failed to delete object");
            failures += 1;
            continue;
        }

        match context.store.delete(media.id).await {
            Ok(_) => tracing::info!(
                media_id = %media.id,
                key = %key,
                post_id = %post_id,
                "Deleted media of deleted post"
            ),
            Err(e) => {
                tracing::error!(error = %e, media_id = %media.id, "Failed to delete media record");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!(
            "{} media item(s) of post {} could not be deleted",
            failures,
            post_id
        );
    }

    tracing::info!(post_id = %post_id, "Processed media deletion for post");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::{InMemoryObjectStore, ObjectStore, ResourceType};
    use crate::store::{InMemoryMediaStore, Media, MediaStore};
    use bytes::Bytes;
    use chrono::Utc;
    use pulse_events::{InMemoryEventBus, RetryPolicy};
    use pulse_server_shared::InternalAuth;
    use serde_json::json;
    use std::time::Duration;

    fn context() -> (MediaContext, Arc<InMemoryMediaStore>, Arc<InMemoryObjectStore>) {
        let store = Arc::new(InMemoryMediaStore::new());
        let objects = Arc::new(InMemoryObjectStore::new());
        let context = MediaContext {
            store: store.clone(),
            objects: objects.clone(),
            max_file_size: 1024,
            internal_auth: InternalAuth::disabled(),
            logging: Default::default(),
        };
        (context, store, objects)
    }

    async fn stored_media(
        store: &InMemoryMediaStore,
        objects: &InMemoryObjectStore,
        with_key: bool,
    ) -> Media {
        let stored = objects
            .upload(ResourceType::Image, Bytes::from_static(b"img"))
            .await
            .unwrap();
        let media = Media {
            id: Uuid::new_v4(),
            store_key: with_key.then(|| stored.key.clone()),
            original_name: "a.png".to_string(),
            mime_type: "image/png".to_string(),
            url: stored.url,
            user_id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        store.insert(&media).await.unwrap();
        media
    }

    fn deleted_event(media_ids: &[Uuid]) -> EventEnvelope {
        EventEnvelope::new(
            POST_DELETED,
            json!({
                "postId": Uuid::new_v4(),
                "userId": Uuid::new_v4(),
                "mediaIds": media_ids
            }),
        )
    }

    #[tokio::test]
    async fn test_post_deleted_removes_objects_and_records() {
        let (context, store, objects) = context();
        let a = stored_media(&store, &objects, true).await;
        let b = stored_media(&store, &objects, true).await;
        let unrelated = stored_media(&store, &objects, true).await;

        handle_post_deleted(&context, &deleted_event(&[a.id, b.id, Uuid::new_v4()]))
            .await
            .unwrap();

        assert_eq!(store.list_all().await.unwrap(), vec![unrelated.clone()]);
        assert!(!objects.contains(a.store_key.as_deref().unwrap()));
        assert!(objects.contains(unrelated.store_key.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let (context, store, objects) = context();
        let a = stored_media(&store, &objects, true).await;
        let event = deleted_event(&[a.id]);

        handle_post_deleted(&context, &event).await.unwrap();
        handle_post_deleted(&context, &event).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_dropped() {
        let (context, store, objects) = context();
        stored_media(&store, &objects, true).await;

        for payload in [
            json!({"postId": "p1"}),
            json!({"postId": "p1", "mediaIds": "not-an-array"}),
            json!({"postId": "p1", "mediaIds": ["not-a-uuid"]}),
        ] {
            let event = EventEnvelope::new(POST_DELETED, payload);
            handle_post_deleted(&context, &event).await.unwrap();
        }
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_record_without_store_key_is_skipped() {
        let (context, store, objects) = context();
        let keyless = stored_media(&store, &objects, false).await;
        let normal = stored_media(&store, &objects, true).await;

        handle_post_deleted(&context, &deleted_event(&[keyless.id, normal.id]))
            .await
            .unwrap();

        assert_eq!(store.list_all().await.unwrap(), vec![keyless]);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_metadata_and_requests_retry() {
        let (context, store, objects) = context();
        let a = stored_media(&store, &objects, true).await;
        objects.set_fail_deletes(true);

        let result = handle_post_deleted(&context, &deleted_event(&[a.id])).await;
        assert!(result.is_err());
        assert_eq!(store.len(), 1);

        objects.set_fail_deletes(false);
        handle_post_deleted(&context, &deleted_event(&[a.id]))
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_consumer_receives_events_from_bus() {
        let (context, store, objects) = context();
        let a = stored_media(&store, &objects, true).await;

        let bus = InMemoryEventBus::new("media-service", RetryPolicy::immediate(1));
        register_consumers(&bus, context).await.unwrap();

        bus.publish(POST_DELETED, json!({
            "postId": Uuid::new_v4(),
            "userId": Uuid::new_v4(),
            "mediaIds": [a.id]
        }))
        .await
        .unwrap();

        assert!(bus.wait_idle(Duration::from_secs(5)).await);
        assert!(store.is_empty());
        assert!(bus.dead_letters().is_empty());
    }
}
