// ============================================================================
// Refresh Token Sweeper
// ============================================================================

use std::sync::Arc;

use chrono::Utc;
use pulse_error::AppResult;
use tokio::time::{self, Duration};
use tracing::{error, info};

use crate::store::IdentityStore;

/// Purge expired refresh tokens every `interval_secs`
pub async fn sweep_expired_refresh_tokens(store: Arc<dyn IdentityStore>, interval_secs: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        if let Err(e) = sweep_once(store.as_ref()).await {
            error!(error = %e, "Failed to purge expired refresh tokens");
        }
    }
}

/// Single sweep run
pub async fn sweep_once(store: &dyn IdentityStore) -> AppResult<u64> {
    let deleted = store.delete_expired_refresh_tokens(Utc::now()).await?;
    if deleted > 0 {
        info!(deleted, "Purged expired refresh tokens");
    }
    Ok(deleted)
}
