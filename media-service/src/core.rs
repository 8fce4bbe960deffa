use bytes::Bytes;
use chrono::Utc;
use pulse_error::{AppError, AppResult};
use pulse_server_shared::utils::log_user_id;
use uuid::Uuid;

use crate::object_store::ResourceType;
use crate::store::Media;
use crate::MediaContext;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A file received from a multipart upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub mime_type: Option<String>,
    pub data: Bytes,
}

/// Store the bytes, then the metadata. If the metadata write fails the
/// stored object is removed again.
pub async fn upload_media(
    context: &MediaContext,
    user_id: Uuid,
    file: UploadedFile,
) -> AppResult<Media> {
    if file.data.len() > context.max_file_size {
        return Err(AppError::validation(too_large_message(context.max_file_size)));
    }

    let mime_type = file
        .mime_type
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
    let resource_type = ResourceType::from_mime(&mime_type);

    tracing::info!(
        original_name = %file.original_name,
        mime_type = %mime_type,
        size_bytes = file.data.len(),
        user = %log_user_id(&context.logging, &user_id),
        "Uploading media"
    );

    let stored = context.objects.upload(resource_type, file.data).await?;

    let media = Media {
        id: Uuid::new_v4(),
        store_key: Some(stored.key.clone()),
        original_name: file.original_name,
        mime_type,
        url: stored.url,
        user_id,
        created_at: Utc::now(),
    };

    if let Err(e) = context.store.insert(&media).await {
        tracing::error!(error = %e, key = %stored.key, "Failed to save media metadata");
        if let Err(cleanup) = context.objects.delete(&stored.key).await {
            tracing::error!(
                error = %cleanup,
                key = %stored.key,
                "Failed to remove orphaned object after metadata failure"
            );
        }
        return Err(e);
    }

    tracing::info!(media_id = %media.id, key = %stored.key, "Media uploaded");
    Ok(media)
}

pub async fn list_media(context: &MediaContext) -> AppResult<Vec<Media>> {
    context.store.list_all().await
}

pub fn too_large_message(max_file_size: usize) -> String {
    format!(
        "File too large. Maximum size is {}MB",
        max_file_size / (1024 * 1024)
    )
}
