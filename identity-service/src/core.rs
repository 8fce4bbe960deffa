use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use pulse_error::{AppError, AppResult};
use pulse_server_shared::utils::log_user_id;
use rand::RngCore;
use uuid::Uuid;

use crate::store::NewUser;
use crate::validation::{validate_login, validate_registration};
use crate::IdentityContext;

/// Refresh tokens are this many random bytes, hex encoded
const REFRESH_TOKEN_BYTES: usize = 40;

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub async fn register(context: &IdentityContext, input: RegisterInput) -> AppResult<TokenPair> {
    let username = input.username.trim().to_string();
    let email = input.email.trim().to_string();
    validate_registration(&username, &email, &input.password)?;

    if context.store.find_user_by_email(&email).await?.is_some() {
        tracing::warn!("Registration attempted with an existing email");
        return Err(AppError::DuplicateUser);
    }

    let password_hash = hash_password(input.password).await?;
    let user = context
        .store
        .create_user(NewUser {
            username,
            email,
            password_hash,
        })
        .await?;

    tracing::info!(
        user = %log_user_id(&context.logging, &user.id),
        "User registered"
    );

    issue_tokens(context, user.id).await
}

/// Returns the user id together with a fresh token pair
pub async fn login(
    context: &IdentityContext,
    email: &str,
    password: &str,
) -> AppResult<(Uuid, TokenPair)> {
    let email = email.trim();
    validate_login(email, password)?;

    let Some(user) = context.store.find_user_by_email(email).await? else {
        tracing::warn!("Login attempted for unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(password.to_string(), user.password_hash.clone()).await? {
        tracing::warn!(
            user = %log_user_id(&context.logging, &user.id),
            "Login failed: wrong password"
        );
        return Err(AppError::InvalidCredentials);
    }

    let tokens = issue_tokens(context, user.id).await?;
    tracing::info!(user = %log_user_id(&context.logging, &user.id), "User logged in");
    Ok((user.id, tokens))
}

/// Consume `refresh_token` and issue a new pair.
///
/// The old token is removed before anything else happens, so a token can be
/// rotated at most once even under concurrent requests.
pub async fn refresh(context: &IdentityContext, refresh_token: &str) -> AppResult<TokenPair> {
    let Some(record) = context.store.take_refresh_token(refresh_token).await? else {
        tracing::warn!("Refresh attempted with unknown or already used token");
        return Err(AppError::InvalidOrExpiredToken);
    };

    if record.expires_at < Utc::now() {
        tracing::warn!(
            user = %log_user_id(&context.logging, &record.user_id),
            "Refresh attempted with expired token"
        );
        return Err(AppError::InvalidOrExpiredToken);
    }

    issue_tokens(context, record.user_id).await
}

/// Revoke `refresh_token`. Unknown tokens are not an error.
pub async fn logout(context: &IdentityContext, refresh_token: &str) -> AppResult<()> {
    let removed = context.store.delete_refresh_token(refresh_token).await?;
    tracing::info!(removed, "Refresh token revoked");
    Ok(())
}

async fn issue_tokens(context: &IdentityContext, user_id: Uuid) -> AppResult<TokenPair> {
    let access = context.tokens.create_access_token(&user_id).map_err(|e| {
        tracing::error!(error = %e, "Failed to create access token");
        AppError::Unknown(e)
    })?;

    let refresh_token = generate_refresh_token();
    let expires_at = Utc::now() + Duration::seconds(context.refresh_token_ttl_secs);
    context
        .store
        .insert_refresh_token(&refresh_token, user_id, expires_at)
        .await?;

    Ok(TokenPair {
        access_token: access.token,
        refresh_token,
    })
}

pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Argon2id with a random salt, off the async runtime
pub async fn hash_password(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::internal(format!("Password hashing failed: {}", e)))
    })
    .await
    .map_err(|e| AppError::internal(format!("Password hashing task failed: {}", e)))?
}

pub async fn verify_password(password: String, password_hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&password_hash)
            .map_err(|e| AppError::internal(format!("Stored password hash is invalid: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| AppError::internal(format!("Password verification task failed: {}", e)))?
}
