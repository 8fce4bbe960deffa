// ============================================================================
// Circuit Breaker
// ============================================================================
//
// One breaker per backend service. Connection failures and 5xx responses
// count as failures; 4xx responses are the caller's fault and count as
// successes.
//
// States:
// - Closed: requests pass through
// - Open: the backend is failing, requests are rejected immediately
// - HalfOpen: after `timeout_secs`, requests are let through again until
//   `success_threshold` successes close the circuit or one failure reopens it
//
// ============================================================================

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use pulse_config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("circuit open for another {0:?}")]
    CircuitOpen(Duration),
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
        }
    }

    fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Ok if a request may be sent now
    pub fn allow_request(&self) -> Result<(), CircuitBreakerError> {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
        let timeout = self.open_timeout();
        if elapsed < timeout {
            return Err(CircuitBreakerError::CircuitOpen(timeout - elapsed));
        }

        inner.state = CircuitState::HalfOpen;
        inner.half_open_successes = 0;
        tracing::info!(service = self.name, "Circuit breaker half-open, probing backend");
        Ok(())
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.half_open_successes = 0;
                    inner.opened_at = None;
                    tracing::info!(service = self.name, "Circuit breaker closed, backend recovered");
                }
            }
            // A response that was already in flight when the circuit opened
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        service = self.name,
                        failures = inner.failures,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_successes = 0;
                tracing::warn!(service = self.name, "Circuit breaker reopened after failed probe");
            }
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, success_threshold: u32, timeout_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test-service",
            CircuitBreakerConfig {
                failure_threshold,
                success_threshold,
                timeout_secs,
            },
        )
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let cb = breaker(3, 2, 60);

        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request().is_ok());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(
            cb.allow_request(),
            Err(CircuitBreakerError::CircuitOpen(_))
        ));
    }

    #[test]
    fn test_half_open_recovery() {
        let cb = breaker(1, 2, 0);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        assert!(cb.allow_request().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let cb = breaker(1, 2, 0);
        cb.record_failure();
        assert!(cb.allow_request().is_ok());
        cb.record_success();

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
