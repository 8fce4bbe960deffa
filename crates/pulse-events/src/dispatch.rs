// ============================================================================
// Handler dispatch: bounded retry, then dead-letter
// ============================================================================
//
// A handler error means "try again later". Each delivery gets one attempt
// plus `max_retries` retries with exponential backoff. When the last attempt
// fails the event is turned into a DeadLetterEvent and the queue moves on,
// so one poisoned event never blocks the events behind it.
//
// Handlers that receive a payload they cannot use should log it and return
// Ok: retrying cannot repair a malformed event.
//
// ============================================================================

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use pulse_config::EventsConfig;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::metrics;
use crate::{EventEnvelope, EventHandler};

/// Upper bound for a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EventsConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Policy without sleeps, for tests
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EventsConfig::default())
    }
}

/// An event whose handler kept failing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEvent {
    pub queue: String,
    pub envelope: EventEnvelope,
    pub attempts: u32,
    /// Last handler error
    pub failure_reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum DeliveryOutcome {
    Handled { attempts: u32 },
    DeadLettered(DeadLetterEvent),
}

/// Run `handler` for one delivery, retrying per `policy`.
pub async fn deliver_with_retry(
    queue: &str,
    handler: &dyn EventHandler,
    envelope: &EventEnvelope,
    policy: &RetryPolicy,
) -> DeliveryOutcome {
    let max_attempts = policy.max_retries + 1;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let started = Instant::now();
        let result = handler.handle(envelope).await;
        metrics::EVENT_HANDLER_DURATION
            .with_label_values(&[queue])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                metrics::EVENTS_CONSUMED_TOTAL
                    .with_label_values(&[queue, &envelope.routing_key])
                    .inc();
                return DeliveryOutcome::Handled { attempts: attempt };
            }
            Err(e) => {
                metrics::EVENT_HANDLER_FAILURES_TOTAL
                    .with_label_values(&[queue, &envelope.routing_key])
                    .inc();

                if attempt >= max_attempts {
                    error!(
                        queue = queue,
                        event_id = %envelope.event_id,
                        routing_key = %envelope.routing_key,
                        attempts = attempt,
                        error = %format!("{:#}", e),
                        "Event handler failed permanently, dead-lettering"
                    );
                    metrics::EVENTS_DEAD_LETTERED_TOTAL
                        .with_label_values(&[queue, &envelope.routing_key])
                        .inc();
                    return DeliveryOutcome::DeadLettered(DeadLetterEvent {
                        queue: queue.to_string(),
                        envelope: envelope.clone(),
                        attempts: attempt,
                        failure_reason: format!("{:#}", e),
                        dead_lettered_at: Utc::now(),
                    });
                }

                let backoff = policy.backoff_for(attempt);
                warn!(
                    queue = queue,
                    event_id = %envelope.event_id,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %format!("{:#}", e),
                    "Event handler failed, will retry"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
