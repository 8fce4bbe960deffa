use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use pulse_error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use pulse_server_shared::ApiJson;
use serde_json::json;

use crate::core::{self, RegisterInput};
use crate::IdentityContext;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
}

fn required_refresh_token(request: RefreshTokenRequest) -> AppResult<String> {
    match request.refresh_token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => {
            tracing::warn!("Refresh token missing from request");
            Err(AppError::validation("Refresh token not provided"))
        }
    }
}

/// POST /api/auth/register
pub async fn register(
    State(context): State<IdentityContext>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let tokens = core::register(
        &context,
        RegisterInput {
            username: request.username,
            email: request.email,
            password: request.password,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            success: true,
            message: "User registered successfully",
            user_id: None,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(context): State<IdentityContext>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let (user_id, tokens) = core::login(&context, &request.email, &request.password).await?;

    Ok(Json(TokenResponse {
        success: true,
        message: "Login successful",
        user_id: Some(user_id.to_string()),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

/// POST /api/auth/refresh-token
pub async fn refresh_token(
    State(context): State<IdentityContext>,
    ApiJson(request): ApiJson<RefreshTokenRequest>,
) -> AppResult<impl IntoResponse> {
    let token = required_refresh_token(request)?;
    let tokens = core::refresh(&context, &token).await?;

    Ok(Json(TokenResponse {
        success: true,
        message: "Token refreshed successfully",
        user_id: None,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

/// POST /api/auth/logout
pub async fn logout(
    State(context): State<IdentityContext>,
    ApiJson(request): ApiJson<RefreshTokenRequest>,
) -> AppResult<impl IntoResponse> {
    let token = required_refresh_token(request)?;
    core::logout(&context, &token).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Logged out successfully"
    })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use pulse_server_shared::TokenManager;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::store::InMemoryIdentityStore;
    use crate::{router, IdentityContext};

    fn app() -> axum::Router {
        router(IdentityContext {
            store: Arc::new(InMemoryIdentityStore::new()),
            tokens: Arc::new(TokenManager::from_secret("handler-test-secret", 3600, "pulse")),
            refresh_token_ttl_secs: 3600,
            logging: Default::default(),
        })
    }

    async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (u16, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status().as_u16();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_mistyped_bodies_get_json_errors() {
        let app = app();

        let (status, body) = post_json(
            &app,
            "/api/auth/register",
            serde_json::json!({"username": 42, "email": "x@example.com", "password": "s3cret!"}),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Request body has missing or invalid fields");

        let (status, body) = post_json(
            &app,
            "/api/auth/refresh-token",
            serde_json::json!({"refreshToken": ["a", "b"]}),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_auth_flow_over_http() {
        let app = app();
        let credentials = serde_json::json!({
            "username": "carol",
            "email": "carol@example.com",
            "password": "s3cret!"
        });

        let (status, body) = post_json(&app, "/api/auth/register", credentials.clone()).await;
        assert_eq!(status, 201);
        assert_eq!(body["message"], "User registered successfully");
        assert!(body.get("userId").is_none());

        let (status, body) = post_json(&app, "/api/auth/register", credentials).await;
        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "User already exists");

        let (status, body) = post_json(
            &app,
            "/api/auth/login",
            serde_json::json!({"email": "carol@example.com", "password": "s3cret!"}),
        )
        .await;
        assert_eq!(status, 200);
        assert!(body["userId"].is_string());
        let refresh = body["refreshToken"].as_str().unwrap().to_string();

        let (status, body) = post_json(
            &app,
            "/api/auth/refresh-token",
            serde_json::json!({"refreshToken": refresh}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Token refreshed successfully");

        let (status, _) = post_json(
            &app,
            "/api/auth/refresh-token",
            serde_json::json!({"refreshToken": refresh}),
        )
        .await;
        assert_eq!(status, 401);

        let (status, body) = post_json(
            &app,
            "/api/auth/logout",
            serde_json::json!({"refreshToken": refresh}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Logged out successfully");
    }

    #[tokio::test]
    async fn test_validation_and_missing_token() {
        let app = app();

        let (status, body) = post_json(
            &app,
            "/api/auth/register",
            serde_json::json!({"username": "x", "email": "x@example.com", "password": "123456"}),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["success"], false);

        let (status, body) = post_json(&app, "/api/auth/refresh-token", serde_json::json!({})).await;
        assert_eq!(status, 400);
        assert_eq!(body["message"], "Refresh token not provided");

        let (status, _) = post_json(
            &app,
            "/api/auth/login",
            serde_json::json!({"email": "nobody@example.com", "password": "whatever"}),
        )
        .await;
        assert_eq!(status, 401);
    }
}
