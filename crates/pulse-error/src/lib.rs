use axum::{extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Message returned for every dependency failure; detail stays in the logs.
pub const GENERIC_SERVER_ERROR: &str = "Internal server error";

/// Application error type shared by all services
///
/// Every variant maps to exactly one error class (validation, authentication,
/// not-found, conflict, rate-limit or dependency) and one HTTP status.
/// Dependency errors carry their full cause for logging but are rendered to
/// clients as a generic message.
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Validation Errors =====
    #[error("Validation error: {0}")]
    Validation(String),

    // ===== Authentication Errors =====
    /// No bearer token on a protected route
    #[error("Authentication required")]
    Unauthenticated,

    /// Bearer token present but not verifiable (bad signature, expired, malformed)
    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Refresh token missing from the store or past its expiry
    #[error("Invalid or expired refresh token")]
    InvalidOrExpiredToken,

    // ===== Lookup & Conflict Errors =====
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("User already exists")]
    DuplicateUser,

    #[error("Resource conflict: {0}")]
    Conflict(String),

    // ===== Rate Limiting =====
    #[error("Too many requests")]
    TooManyRequests,

    // ===== Dependency Errors =====
    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// A backend could not be reached by the gateway
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::InvalidToken => StatusCode::FORBIDDEN,
            AppError::InvalidCredentials | AppError::InvalidOrExpiredToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateUser | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-facing message (without sensitive details)
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::Unauthenticated => {
                "Authentication required! Please login to continue".to_string()
            }
            AppError::InvalidToken => "Invalid token".to_string(),
            AppError::InvalidCredentials => "Invalid credentials".to_string(),
            AppError::InvalidOrExpiredToken => "Invalid or expired refresh token".to_string(),
            AppError::NotFound(what) => format!("{} not found", what),
            AppError::DuplicateUser => "User already exists".to_string(),
            AppError::Conflict(msg) => msg.clone(),
            AppError::TooManyRequests => "Too many requests".to_string(),
            _ => GENERIC_SERVER_ERROR.to_string(),
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::InvalidOrExpiredToken => "INVALID_OR_EXPIRED_TOKEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DuplicateUser => "DUPLICATE_USER",
            AppError::Conflict(_) => "CONFLICT",
            AppError::TooManyRequests => "RATE_LIMIT_EXCEEDED",
            #[cfg(feature = "database")]
            AppError::Database(_) => "DATABASE_ERROR",
            #[cfg(feature = "redis")]
            AppError::Redis(_) => "REDIS_ERROR",
            AppError::EventBus(_) => "EVENT_BUS_ERROR",
            AppError::ObjectStore(_) => "OBJECT_STORE_ERROR",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
            _ => "UNKNOWN_ERROR",
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(
                error = %self,
                error_code = %code,
                "Authentication failed"
            );
        } else {
            tracing::debug!(
                error = %self,
                error_code = %code,
                "Client error occurred"
            );
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        self.log();

        let status = self.status_code();
        let body = json!({
            "success": false,
            "message": self.user_message(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Body rejections become validation errors; serde detail is only logged
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Rejected JSON body");

        let message = match rejection {
            JsonRejection::JsonDataError(_) => "Request body has missing or invalid fields",
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
            JsonRejection::MissingJsonContentType(_) => "Expected an application/json request body",
            _ => "Failed to read request body",
        };
        AppError::Validation(message.to_string())
    }
}

// ============================================================================
// Helper functions for creating common errors
// ============================================================================

impl AppError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Create a not-found error for the named resource ("Post", "User", ...)
    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn event_bus(msg: impl Into<String>) -> Self {
        AppError::EventBus(msg.into())
    }

    pub fn object_store(msg: impl Into<String>) -> Self {
        AppError::ObjectStore(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        AppError::Upstream(msg.into())
    }

    /// Create an internal server error
    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// True for errors caused by a failing dependency rather than the caller
    pub fn is_dependency_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::InvalidToken.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::InvalidOrExpiredToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::not_found("Post").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::DuplicateUser.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::TooManyRequests.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::event_bus("broker down").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_client_error_body() {
        let (status, body) = body_json(AppError::not_found("Post")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Post not found");
    }

    #[tokio::test]
    async fn test_dependency_error_hides_detail() {
        let err = AppError::internal("connection refused at 10.0.0.7:5432");
        assert!(err.is_dependency_error());

        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], GENERIC_SERVER_ERROR);
        assert!(!body.to_string().contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn test_anyhow_errors_are_generic() {
        let err: AppError = anyhow::anyhow!("redis timeout").into();
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"success": false, "message": GENERIC_SERVER_ERROR}));
    }
}
