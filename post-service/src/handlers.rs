use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use pulse_error::AppResult;
use pulse_server_shared::{ApiJson, TrustedUser};
use serde::Deserialize;
use serde_json::json;

use crate::core::{self, DEFAULT_LIMIT, DEFAULT_PAGE};
use crate::PostContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub content: Option<String>,
    pub media_ids: Option<Vec<String>>,
}

/// Raw strings so malformed values fall back to defaults instead of 400
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// POST /api/posts/create-post
pub async fn create_post(
    State(context): State<PostContext>,
    TrustedUser(user_id): TrustedUser,
    ApiJson(request): ApiJson<CreatePostRequest>,
) -> AppResult<impl IntoResponse> {
    let media_ids = core::parse_media_ids(request.media_ids)?;
    let post = core::create_post(&context, user_id, request.content, media_ids).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Post created successfully",
            "postId": post.id
        })),
    ))
}

/// GET /api/posts/all-posts?page=&limit=
pub async fn list_posts(
    State(context): State<PostContext>,
    _user: TrustedUser,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let page = core::parse_positive(query.page.as_deref(), DEFAULT_PAGE);
    let limit = core::parse_positive(query.limit.as_deref(), DEFAULT_LIMIT);

    Ok(Json(core::list_posts(&context, page, limit).await?))
}

/// GET /api/posts/:id
pub async fn get_post(
    State(context): State<PostContext>,
    _user: TrustedUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(core::get_post(&context, &id).await?))
}

/// DELETE /api/posts/:id
pub async fn delete_post(
    State(context): State<PostContext>,
    TrustedUser(user_id): TrustedUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    core::delete_post(&context, user_id, &id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Post deleted successfully"
    })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use pulse_config::{CacheConfig, LoggingConfig};
    use pulse_server_shared::{InternalAuth, InternalTokenSigner, INTERNAL_TOKEN_HEADER, USER_ID_HEADER};
    use serde_json::Value;
    use tokio::sync::Notify;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::cache::InMemoryCache;
    use crate::store::InMemoryPostStore;
    use crate::{router, PostContext};

    fn app(internal_auth: InternalAuth) -> axum::Router {
        router(PostContext {
            store: Arc::new(InMemoryPostStore::new()),
            cache: Arc::new(InMemoryCache::new()),
            cache_config: CacheConfig::default(),
            outbox_notify: Arc::new(Notify::new()),
            internal_auth,
            logging: LoggingConfig::default(),
        })
    }

    async fn send(
        app: &axum::Router,
        method: &str,
        uri: &str,
        headers: &[(&str, String)],
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_post_lifecycle_over_http() {
        let app = app(InternalAuth::disabled());
        let owner = vec![(USER_ID_HEADER, Uuid::new_v4().to_string())];

        let (status, body) = send(
            &app,
            "POST",
            "/api/posts/create-post",
            &owner,
            Some(serde_json::json!({"content": "hello world"})),
        )
        .await;
        assert_eq!(status, 201);
        assert_eq!(body["message"], "Post created successfully");
        let post_id = body["postId"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "GET", "/api/posts/all-posts?page=x", &owner, None).await;
        assert_eq!(status, 200);
        assert_eq!(body["currentPage"], 1);
        assert_eq!(body["totalPosts"], 1);

        let (status, body) =
            send(&app, "GET", &format!("/api/posts/{}", post_id), &owner, None).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["content"], "hello world");

        let stranger = vec![(USER_ID_HEADER, Uuid::new_v4().to_string())];
        let (status, body) =
            send(&app, "DELETE", &format!("/api/posts/{}", post_id), &stranger, None).await;
        assert_eq!(status, 404);
        assert_eq!(body["message"], "Post not found");

        let (status, body) =
            send(&app, "DELETE", &format!("/api/posts/{}", post_id), &owner, None).await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Post deleted successfully");
    }

    #[tokio::test]
    async fn test_mistyped_body_is_json_validation_error() {
        let app = app(InternalAuth::disabled());
        let owner = vec![(USER_ID_HEADER, Uuid::new_v4().to_string())];

        let (status, body) = send(
            &app,
            "POST",
            "/api/posts/create-post",
            &owner,
            Some(serde_json::json!({"content": 5})),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Request body has missing or invalid fields");

        let request = Request::builder()
            .method("POST")
            .uri("/api/posts/create-post")
            .header(USER_ID_HEADER, Uuid::new_v4().to_string())
            .header("content-type", "application/json")
            .body(Body::from("{\"content\": "))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Request body is not valid JSON");
    }

    #[tokio::test]
    async fn test_requests_without_identity_are_rejected() {
        let app = app(InternalAuth::disabled());
        let (status, body) = send(
            &app,
            "POST",
            "/api/posts/create-post",
            &[],
            Some(serde_json::json!({"content": "anonymous"})),
        )
        .await;
        assert_eq!(status, 401);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_signed_identity_required_when_enabled() {
        let signer = InternalTokenSigner::new("internal-secret", 60);
        let app = app(InternalAuth::with_signer(InternalTokenSigner::new("internal-secret", 60)));
        let user_id = Uuid::new_v4();

        let (status, _) = send(
            &app,
            "GET",
            "/api/posts/all-posts",
            &[(USER_ID_HEADER, user_id.to_string())],
            None,
        )
        .await;
        assert_eq!(status, 401);

        let token = signer.sign(&user_id, chrono::Utc::now().timestamp());
        let (status, _) = send(
            &app,
            "GET",
            "/api/posts/all-posts",
            &[
                (USER_ID_HEADER, user_id.to_string()),
                (INTERNAL_TOKEN_HEADER, token),
            ],
            None,
        )
        .await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn test_invalid_media_ids_rejected() {
        let app = app(InternalAuth::disabled());
        let (status, body) = send(
            &app,
            "POST",
            "/api/posts/create-post",
            &[(USER_ID_HEADER, Uuid::new_v4().to_string())],
            Some(serde_json::json!({"content": "with media", "mediaIds": ["bogus"]})),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
    }
}
