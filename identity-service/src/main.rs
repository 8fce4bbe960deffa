// ============================================================================
// Identity Service
// ============================================================================
//
// Registration, login and token lifecycle for Pulse users.
//
// Architecture:
// - Stateless access tokens (JWT), refresh tokens persisted in Postgres
// - Horizontally scalable
//
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use identity_service::store::PgIdentityStore;
use identity_service::{router, sweeper, IdentityContext};
use pulse_config::Config;
use pulse_server_shared::server::{serve, with_service_layers};
use pulse_server_shared::telemetry::init_tracing;
use pulse_server_shared::TokenManager;
use tracing::info;

const DEFAULT_PORT: u16 = 3001;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config);

    info!("=== Identity Service Starting ===");

    info!("Connecting to database...");
    let db_pool = pulse_db::create_pool(config.require_database_url()?, &config.db).await?;
    info!("Connected to database");

    info!("Applying database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to apply database migrations")?;
    info!("Database migrations applied successfully");

    let tokens = Arc::new(
        TokenManager::new(&config.security).context("Failed to initialize token manager")?,
    );

    let store = Arc::new(PgIdentityStore::new(db_pool));

    tokio::spawn(sweeper::sweep_expired_refresh_tokens(
        store.clone(),
        config.security.refresh_token_sweep_interval_secs,
    ));

    let context = IdentityContext {
        store,
        tokens,
        refresh_token_ttl_secs: config.security.refresh_token_ttl_secs(),
        logging: config.logging.clone(),
    };

    let app = with_service_layers(router(context), "identity-service");
    serve(app, &config.bind_address(DEFAULT_PORT)).await
}
