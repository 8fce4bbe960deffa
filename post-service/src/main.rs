// ============================================================================
// Post Service
// ============================================================================
//
// Architecture:
// - Postgres is the source of truth, Redis a read-through cache
// - Events leave through the outbox dispatcher, never from request handlers
// - Horizontally scalable (outbox rows are claimed with SKIP LOCKED)
//
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use post_service::cache::RedisCache;
use post_service::outbox::{OutboxDispatcher, PgOutboxStore};
use post_service::store::PgPostStore;
use post_service::{router, PostContext};
use pulse_config::Config;
use pulse_redis::RedisClient;
use pulse_server_shared::server::{serve, with_service_layers};
use pulse_server_shared::telemetry::init_tracing;
use pulse_server_shared::InternalAuth;
use tokio::sync::Notify;
use tracing::info;

const SERVICE_NAME: &str = "post-service";
const DEFAULT_PORT: u16 = 3002;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config);

    info!("=== Post Service Starting ===");

    info!("Connecting to database...");
    let db_pool = pulse_db::create_pool(config.require_database_url()?, &config.db).await?;
    info!("Connected to database");

    info!("Applying database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to apply database migrations")?;
    info!("Database migrations applied successfully");

    info!("Connecting to Redis...");
    let redis = RedisClient::connect(config.require_redis_url()?)
        .await
        .context("Failed to connect to Redis")?;
    info!("Connected to Redis");

    let bus = pulse_events::build_event_bus(&config.events, SERVICE_NAME)
        .await
        .context("Failed to initialize event bus")?;

    let outbox_notify = Arc::new(Notify::new());
    let dispatcher = OutboxDispatcher::new(
        Arc::new(PgOutboxStore::new(db_pool.clone())),
        bus,
        outbox_notify.clone(),
        config.outbox.clone(),
    );
    tokio::spawn(dispatcher.run());

    let internal_auth = InternalAuth::from_config(&config.security);
    if !internal_auth.is_enabled() {
        info!("INTERNAL_AUTH_SECRET not set; trusting x-user-id from the gateway");
    }

    let context = PostContext {
        store: Arc::new(PgPostStore::new(db_pool)),
        cache: Arc::new(RedisCache::new(redis)),
        cache_config: config.cache.clone(),
        outbox_notify,
        internal_auth,
        logging: config.logging.clone(),
    };

    let app = with_service_layers(router(context), SERVICE_NAME);
    serve(app, &config.bind_address(DEFAULT_PORT)).await
}
