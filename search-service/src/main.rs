// ============================================================================
// Search Service
// ============================================================================
//
// Architecture:
// - Denormalized projection of posts, never written through HTTP
// - Postgres full-text index (generated tsvector + GIN)
// - Consumers are idempotent, so redelivered events are harmless
//
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use pulse_config::Config;
use pulse_server_shared::server::{serve, with_service_layers};
use pulse_server_shared::telemetry::init_tracing;
use pulse_server_shared::InternalAuth;
use search_service::consumers::register_consumers;
use search_service::store::{PgSearchStore, SearchStore};
use search_service::{router, SearchContext};
use tracing::info;

const SERVICE_NAME: &str = "search-service";
const DEFAULT_PORT: u16 = 3004;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config);

    info!("=== Search Service Starting ===");

    info!("Connecting to database...");
    let db_pool = pulse_db::create_pool(config.require_database_url()?, &config.db).await?;
    info!("Connected to database");

    info!("Applying database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to apply database migrations")?;
    info!("Database migrations applied successfully");

    let store: Arc<dyn SearchStore> = Arc::new(PgSearchStore::new(db_pool));

    let bus = pulse_events::build_event_bus(&config.events, SERVICE_NAME)
        .await
        .context("Failed to initialize event bus")?;
    register_consumers(bus.as_ref(), store.clone())
        .await
        .context("Failed to subscribe to post events")?;

    let context = SearchContext {
        store,
        internal_auth: InternalAuth::from_config(&config.security),
    };

    let app = with_service_layers(router(context), SERVICE_NAME);
    serve(app, &config.bind_address(DEFAULT_PORT)).await
}
