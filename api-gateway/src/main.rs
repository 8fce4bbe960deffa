// ============================================================================
// API Gateway
// ============================================================================
//
// Architecture:
// - Stateless (can scale horizontally); rate limit windows live in Redis
// - Verify-only token handling is enough here (JWT_PUBLIC_KEY or JWT_SECRET)
// - Backends trust the x-user-id it sets
//
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use api_gateway::proxy::ServiceClient;
use api_gateway::rate_limit::RedisRateLimiter;
use api_gateway::routing::{Backend, Upstreams};
use api_gateway::{router, GatewayState};
use pulse_config::Config;
use pulse_redis::RedisClient;
use pulse_server_shared::server::{serve, with_service_layers};
use pulse_server_shared::telemetry::init_tracing;
use pulse_server_shared::{InternalTokenSigner, TokenManager};
use tracing::{info, warn};

const SERVICE_NAME: &str = "api-gateway";
const DEFAULT_PORT: u16 = 3000;

/// Room for multipart framing on top of the largest accepted upload
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config);

    info!("=== API Gateway Starting ===");

    let upstreams = Upstreams::from_config(&config.services);
    for backend in Backend::ALL {
        info!(service = backend.name(), url = upstreams.url(backend), "Backend configured");
    }

    info!("Connecting to Redis...");
    let redis = RedisClient::connect(config.require_redis_url()?)
        .await
        .context("Failed to connect to Redis")?;
    info!(
        window_secs = config.security.rate_limit_window_secs,
        max_requests = config.security.rate_limit_max_requests,
        "Connected to Redis, rate limiting enabled"
    );

    if config.security.trust_proxy_headers {
        info!("Rate limiting keyed on X-Forwarded-For / X-Real-IP");
    }

    let tokens = TokenManager::new(&config.security).context("Failed to initialize token verification")?;

    let internal_signer = config.security.internal_auth_secret.as_deref().map(|secret| {
        Arc::new(InternalTokenSigner::new(
            secret,
            config.security.internal_token_ttl_secs,
        ))
    });
    if internal_signer.is_none() {
        warn!("INTERNAL_AUTH_SECRET not set; backends will trust x-user-id unsigned");
    }

    let client = ServiceClient::new(
        &config.services,
        config.media.max_file_size + BODY_OVERHEAD_BYTES,
    )?;

    let state = GatewayState {
        upstreams: Arc::new(upstreams),
        client: Arc::new(client),
        tokens: Arc::new(tokens),
        limiter: Arc::new(RedisRateLimiter::new(redis, &config.security)),
        trust_proxy_headers: config.security.trust_proxy_headers,
        internal_signer,
        logging: config.logging.clone(),
    };

    let app = with_service_layers(router(state), SERVICE_NAME);
    serve(app, &config.bind_address(DEFAULT_PORT)).await
}
