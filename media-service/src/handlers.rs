// ============================================================================
// Media Service Handlers
// ============================================================================

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::BytesMut;
use pulse_error::{AppError, AppResult};
use pulse_server_shared::TrustedUser;
use serde_json::json;

use crate::core::{self, too_large_message, UploadedFile};
use crate::object_store::ObjectStoreError;
use crate::{FileContext, MediaContext};

const FILE_FIELD: &str = "file";
const OCTET_STREAM: &str = "application/octet-stream";
const DEFAULT_FILE_NAME: &str = "upload";

fn multipart_error(e: MultipartError) -> AppError {
    tracing::warn!(error = %e, "Rejected multipart body");
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::validation("File too large");
    }
    AppError::validation(format!("Invalid multipart body: {}", e.body_text()))
}

/// POST /api/media/upload (multipart, field `file`)
pub async fn upload_media(
    State(context): State<MediaContext>,
    TrustedUser(user_id): TrustedUser,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut upload = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_string();
        let mime_type = field.content_type().map(str::to_string);

        let mut data = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if data.len() + chunk.len() > context.max_file_size {
                tracing::warn!(
                    max_file_size = context.max_file_size,
                    "Upload exceeds maximum file size"
                );
                return Err(AppError::validation(too_large_message(context.max_file_size)));
            }
            data.extend_from_slice(&chunk);
        }

        upload = Some(UploadedFile {
            original_name,
            mime_type,
            data: data.freeze(),
        });
        break;
    }

    let Some(file) = upload else {
        tracing::warn!("Upload request without a file field");
        return Err(AppError::validation(
            "No file found. Please add a file and try again!",
        ));
    };

    let media = core::upload_media(&context, user_id, file).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "mediaId": media.id,
            "url": media.url,
            "message": "Media uploaded successfully"
        })),
    ))
}

/// GET /api/media/get
pub async fn list_media(
    State(context): State<MediaContext>,
    _user: TrustedUser,
) -> AppResult<impl IntoResponse> {
    let media = core::list_media(&context).await?;
    Ok(Json(json!({ "success": true, "data": media })))
}

/// GET /files/:kind/:id
pub async fn serve_file(
    State(files): State<FileContext>,
    Path((kind, id)): Path<(String, String)>,
) -> AppResult<Response> {
    let key = format!("{}/{}", kind, id);
    let data = match files.objects.read(&key).await {
        Ok(Some(data)) => data,
        Ok(None) | Err(ObjectStoreError::InvalidKey(_)) => {
            return Err(AppError::not_found("File"));
        }
        Err(e) => return Err(e.into()),
    };

    // Objects without a metadata row (e.g. mid-deletion) are served as raw bytes
    let content_type = files
        .store
        .find_by_store_key(&key)
        .await?
        .and_then(|media| HeaderValue::from_str(&media.mime_type).ok())
        .unwrap_or_else(|| HeaderValue::from_static(OCTET_STREAM));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .header(header::CACHE_CONTROL, "public, max-age=86400")
        .body(Body::from(data))
        .map_err(|e| AppError::internal(format!("Failed to build file response: {}", e)))
}
