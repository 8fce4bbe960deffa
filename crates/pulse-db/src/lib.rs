//! # Pulse Database
//!
//! Connection pooling and small helpers shared by every Postgres-backed service.
//! Each service owns its schema and runs its own embedded migrations.

use std::time::Duration;

use anyhow::{Context, Result};
use pulse_config::DbConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

/// Database connection pool type
pub type DbPool = Pool<Postgres>;

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Create a PostgreSQL connection pool
pub async fn create_pool(database_url: &str, db_config: &DbConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(db_config.idle_timeout_secs)))
        .test_before_acquire(true)
        .connect(database_url)
        .await
        .context("Failed to connect to Postgres")?;

    tracing::info!(
        max_connections = db_config.max_connections,
        "Database pool created"
    );

    Ok(pool)
}

/// True when the error is a unique-constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(!is_unique_violation(&sqlx::Error::PoolTimedOut));
    }

    #[tokio::test]
    #[ignore] // Requires Postgres
    async fn test_create_pool() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = create_pool(&url, &DbConfig::default()).await.unwrap();
        let one: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(one.0, 1);
    }
}
