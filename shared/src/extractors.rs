// ============================================================================
// TrustedUser Extractor - Gateway Auth Pattern
// ============================================================================
//
// Extracts the caller's identity from the X-User-Id header set by the gateway.
//
// SECURITY: without INTERNAL_AUTH_SECRET this header is trusted
// unconditionally, so backends must only be reachable through the gateway.
// With the secret configured the header must be accompanied by a valid
// X-Internal-Token for the same user id.
//
// Usage:
// ```rust
// async fn handler(TrustedUser(user_id): TrustedUser, ...) -> AppResult<...> {
//     // ...
// }
// ```
//
// The service state must provide `InternalAuth` via `FromRef`.
//
// ============================================================================

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequest, FromRequestParts},
    http::request::Parts,
};
use chrono::Utc;
use pulse_config::SecurityConfig;
use pulse_error::AppError;
use uuid::Uuid;

use crate::internal_token::InternalTokenSigner;
use crate::{INTERNAL_TOKEN_HEADER, USER_ID_HEADER};

/// Verification settings for gateway-propagated identity
#[derive(Clone, Debug, Default)]
pub struct InternalAuth {
    signer: Option<Arc<InternalTokenSigner>>,
}

impl InternalAuth {
    /// Trust `x-user-id` as-is
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_signer(signer: InternalTokenSigner) -> Self {
        Self {
            signer: Some(Arc::new(signer)),
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        match &config.internal_auth_secret {
            Some(secret) => Self::with_signer(InternalTokenSigner::new(
                secret,
                config.internal_token_ttl_secs,
            )),
            None => Self::disabled(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.signer.is_some()
    }

    fn check(&self, parts: &Parts, user_id: Uuid) -> Result<(), AppError> {
        let Some(signer) = &self.signer else {
            return Ok(());
        };

        let token = parts
            .headers
            .get(INTERNAL_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::warn!("Missing X-Internal-Token on request with X-User-Id");
                AppError::Unauthenticated
            })?;

        match signer.verify(token, Utc::now().timestamp()) {
            Ok(asserted) if asserted == user_id => Ok(()),
            Ok(_) => {
                tracing::warn!("X-Internal-Token was issued for a different user");
                Err(AppError::Unauthenticated)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rejected X-Internal-Token");
                Err(AppError::Unauthenticated)
            }
        }
    }
}

/// User identity propagated from the gateway.
#[derive(Debug, Clone, Copy)]
pub struct TrustedUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for TrustedUser
where
    S: Send + Sync,
    InternalAuth: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or_else(|| {
                tracing::warn!(
                    "Missing or invalid X-User-Id header. \
                     Is this request coming through the gateway?"
                );
                AppError::Unauthenticated
            })?;

        InternalAuth::from_ref(state).check(parts, user_id)?;

        tracing::trace!(user_id = %user_id, "TrustedUser extracted from header");
        Ok(TrustedUser(user_id))
    }
}

/// `axum::Json` whose rejection renders as an `AppError` body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(auth: InternalAuth, headers: &[(&str, String)]) -> Result<Uuid, AppError> {
        let mut builder = Request::builder().uri("/api/posts");
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        TrustedUser::from_request_parts(&mut parts, &auth)
            .await
            .map(|u| u.0)
    }

    #[tokio::test]
    async fn test_header_trusted_without_secret() {
        let user_id = Uuid::new_v4();
        let result = extract(InternalAuth::disabled(), &[(USER_ID_HEADER, user_id.to_string())]).await;
        assert_eq!(result.unwrap(), user_id);
    }

    #[tokio::test]
    async fn test_missing_header_rejected() {
        let result = extract(InternalAuth::disabled(), &[]).await;
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_invalid_uuid_rejected() {
        let result = extract(InternalAuth::disabled(), &[(USER_ID_HEADER, "42".to_string())]).await;
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_signed_identity_required_when_enabled() {
        let signer = InternalTokenSigner::new("internal-secret", 60);
        let auth = InternalAuth::with_signer(signer.clone());
        let user_id = Uuid::new_v4();

        let unsigned = extract(auth.clone(), &[(USER_ID_HEADER, user_id.to_string())]).await;
        assert!(matches!(unsigned, Err(AppError::Unauthenticated)));

        let token = signer.sign(&user_id, Utc::now().timestamp());
        let signed = extract(
            auth.clone(),
            &[
                (USER_ID_HEADER, user_id.to_string()),
                (INTERNAL_TOKEN_HEADER, token.clone()),
            ],
        )
        .await;
        assert_eq!(signed.unwrap(), user_id);

        // Token for someone else must not vouch for this header
        let spoofed = extract(
            auth,
            &[
                (USER_ID_HEADER, Uuid::new_v4().to_string()),
                (INTERNAL_TOKEN_HEADER, token),
            ],
        )
        .await;
        assert!(matches!(spoofed, Err(AppError::Unauthenticated)));
    }

    #[derive(Debug, serde::Deserialize)]
    struct Greeting {
        content: String,
    }

    async fn extract_json(body: &str) -> Result<Greeting, AppError> {
        let request = Request::builder()
            .method("POST")
            .uri("/api/posts/create-post")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap();
        ApiJson::<Greeting>::from_request(request, &()).await.map(|ApiJson(g)| g)
    }

    #[tokio::test]
    async fn test_api_json_rejections_are_validation_errors() {
        assert_eq!(extract_json(r#"{"content":"hi"}"#).await.unwrap().content, "hi");

        for body in [r#"{"content": 5}"#, r#"{}"#, "{not json"] {
            let err = extract_json(body).await.unwrap_err();
            match err {
                AppError::Validation(message) => assert!(!message.contains("invalid type")),
                other => panic!("expected validation error, got {:?}", other),
            }
        }
    }
}
