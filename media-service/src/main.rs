// ============================================================================
// Media Service
// ============================================================================
//
// Architecture:
// - Object bytes in the object store, metadata in Postgres
// - Consumes `post.deleted` to remove media of deleted posts
// - Serves locally stored objects under /files
//
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use media_service::consumers::register_consumers;
use media_service::object_store::LocalObjectStore;
use media_service::store::PgMediaStore;
use media_service::{file_router, router, MediaContext};
use pulse_config::Config;
use pulse_server_shared::server::{serve, with_service_layers};
use pulse_server_shared::telemetry::init_tracing;
use pulse_server_shared::InternalAuth;
use tracing::info;

const SERVICE_NAME: &str = "media-service";
const DEFAULT_PORT: u16 = 3003;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config);

    info!("=== Media Service Starting ===");

    info!("Connecting to database...");
    let db_pool = pulse_db::create_pool(config.require_database_url()?, &config.db).await?;
    info!("Connected to database");

    info!("Applying database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to apply database migrations")?;
    info!("Database migrations applied successfully");

    let objects = Arc::new(LocalObjectStore::new(
        &config.media.storage_dir,
        &config.media.public_base_url,
    ));
    tokio::fs::create_dir_all(objects.root())
        .await
        .context("Failed to create media storage directory")?;
    info!(
        storage_dir = %objects.root().display(),
        max_file_size = config.media.max_file_size,
        "Object store ready"
    );

    let context = MediaContext {
        store: Arc::new(PgMediaStore::new(db_pool)),
        objects: objects.clone(),
        max_file_size: config.media.max_file_size,
        internal_auth: InternalAuth::from_config(&config.security),
        logging: config.logging.clone(),
    };

    let bus = pulse_events::build_event_bus(&config.events, SERVICE_NAME)
        .await
        .context("Failed to initialize event bus")?;
    register_consumers(bus.as_ref(), context.clone())
        .await
        .context("Failed to subscribe to post.deleted")?;

    let files = file_router(objects, context.store.clone());
    let app = with_service_layers(router(context).merge(files), SERVICE_NAME);
    serve(app, &config.bind_address(DEFAULT_PORT)).await
}
