// ============================================================================
// Identity Store
// ============================================================================
//
// Users and refresh tokens. `PgIdentityStore` is the deployed backend;
// `InMemoryIdentityStore` backs unit tests and the cross-service scenarios.
//
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_db::{is_unique_violation, DbPool};
use pulse_error::{AppError, AppResult};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Insert a user; `DuplicateUser` when the username or email is taken
    async fn create_user(&self, user: NewUser) -> AppResult<User>;

    async fn insert_refresh_token(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Remove and return a refresh token. At most one caller gets the record.
    async fn take_refresh_token(&self, token: &str) -> AppResult<Option<RefreshTokenRecord>>;

    /// Returns whether a record was removed
    async fn delete_refresh_token(&self, token: &str) -> AppResult<bool>;

    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

pub struct PgIdentityStore {
    pool: DbPool,
}

impl PgIdentityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e) => Err(AppError::DuplicateUser),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_refresh_token(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(token)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take_refresh_token(&self, token: &str) -> AppResult<Option<RefreshTokenRecord>> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            DELETE FROM refresh_tokens
            WHERE token = $1
            RETURNING token, user_id, expires_at
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete_refresh_token(&self, token: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryIdentityStore;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct State {
        users: Vec<User>,
        tokens: HashMap<String, RefreshTokenRecord>,
    }

    #[derive(Default)]
    pub struct InMemoryIdentityStore {
        state: Mutex<State>,
    }

    impl InMemoryIdentityStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn refresh_token_count(&self) -> usize {
            self.state.lock().unwrap().tokens.len()
        }

        /// Force a stored token's expiry (for exercising expiry paths)
        pub fn set_refresh_token_expiry(&self, token: &str, expires_at: DateTime<Utc>) {
            if let Some(record) = self.state.lock().unwrap().tokens.get_mut(token) {
                record.expires_at = expires_at;
            }
        }
    }

    #[async_trait]
    impl IdentityStore for InMemoryIdentityStore {
        async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
            let state = self.state.lock().unwrap();
            Ok(state.users.iter().find(|u| u.email == email).cloned())
        }

        async fn create_user(&self, user: NewUser) -> AppResult<User> {
            let mut state = self.state.lock().unwrap();
            if state
                .users
                .iter()
                .any(|u| u.username == user.username || u.email == user.email)
            {
                return Err(AppError::DuplicateUser);
            }

            let created = User {
                id: Uuid::new_v4(),
                username: user.username,
                email: user.email,
                password_hash: user.password_hash,
                created_at: Utc::now(),
            };
            state.users.push(created.clone());
            Ok(created)
        }

        async fn insert_refresh_token(
            &self,
            token: &str,
            user_id: Uuid,
            expires_at: DateTime<Utc>,
        ) -> AppResult<()> {
            self.state.lock().unwrap().tokens.insert(
                token.to_string(),
                RefreshTokenRecord {
                    token: token.to_string(),
                    user_id,
                    expires_at,
                },
            );
            Ok(())
        }

        async fn take_refresh_token(&self, token: &str) -> AppResult<Option<RefreshTokenRecord>> {
            Ok(self.state.lock().unwrap().tokens.remove(token))
        }

        async fn delete_refresh_token(&self, token: &str) -> AppResult<bool> {
            Ok(self.state.lock().unwrap().tokens.remove(token).is_some())
        }

        async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> AppResult<u64> {
            let mut state = self.state.lock().unwrap();
            let before = state.tokens.len();
            state.tokens.retain(|_, record| record.expires_at >= now);
            Ok((before - state.tokens.len()) as u64)
        }
    }
}
