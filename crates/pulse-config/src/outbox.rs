// ============================================================================
// Outbox Dispatcher Configuration
// ============================================================================

use crate::constants::{DEFAULT_OUTBOX_BATCH_SIZE, DEFAULT_OUTBOX_POLL_INTERVAL_MS};
use crate::env_or;

#[derive(Clone, Debug)]
pub struct OutboxConfig {
    /// Poll interval when no write has woken the dispatcher
    pub poll_interval_ms: u64,
    /// Maximum rows claimed per poll
    pub batch_size: i64,
}

impl OutboxConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            poll_interval_ms: env_or("OUTBOX_POLL_INTERVAL_MS", DEFAULT_OUTBOX_POLL_INTERVAL_MS),
            batch_size: env_or("OUTBOX_BATCH_SIZE", DEFAULT_OUTBOX_BATCH_SIZE),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_OUTBOX_POLL_INTERVAL_MS,
            batch_size: DEFAULT_OUTBOX_BATCH_SIZE,
        }
    }
}
