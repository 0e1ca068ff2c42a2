use std::sync::Arc;
use tokio::sync::Mutex;
use std::time::{Duration, Instant};

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards a best-effort side channel (the dead-letter producer). While open,
// calls fail immediately instead of waiting out a broker timeout, so the
// ingestion loop is not slowed down by an unavailable dead-letter topic.
//
// Closed -> Open after `failure_threshold` consecutive failures.
// Open -> HalfOpen once `open_timeout` has elapsed.
// HalfOpen -> Closed after `success_threshold` successes, or back to Open on
// the first failure.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

#[derive(Clone)]
pub struct CircuitBreaker {
    phase: Arc<Mutex<Phase>>,
    config: CircuitBreakerConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("operation failed: {0}")]
    OperationFailed(E),
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            phase: Arc::new(Mutex::new(Phase::Closed { failures: 0 })),
            config,
        }
    }

    /// Run `operation` unless the circuit is open.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        let result = operation.await;
        self.observe(result.is_ok()).await;
        result.map_err(CircuitBreakerError::OperationFailed)
    }

    pub async fn state(&self) -> CircuitState {
        match *self.phase.lock().await {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    async fn admit(&self) -> bool {
        let mut phase = self.phase.lock().await;
        if let Phase::Open { since } = *phase {
            if since.elapsed() < self.config.open_timeout {
                return false;
            }
            tracing::info!("Circuit breaker half-open, probing");
            *phase = Phase::HalfOpen { successes: 0 };
        }
        true
    }

    async fn observe(&self, success: bool) {
        let mut phase = self.phase.lock().await;
        let next = match (&*phase, success) {
            (Phase::Closed { .. }, true) => Phase::Closed { failures: 0 },
            (Phase::Closed { failures }, false) => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    tracing::warn!(failures = failures, "Circuit breaker opening");
                    Phase::Open { since: Instant::now() }
                } else {
                    Phase::Closed { failures }
                }
            }
            (Phase::HalfOpen { successes }, true) => {
                let successes = successes + 1;
                if successes >= self.config.success_threshold {
                    tracing::info!(successes = successes, "Circuit breaker closing");
                    Phase::Closed { failures: 0 }
                } else {
                    Phase::HalfOpen { successes }
                }
            }
            (Phase::HalfOpen { .. }, false) => {
                tracing::warn!("Failure while half-open, reopening circuit");
                Phase::Open { since: Instant::now() }
            }
            // A call admitted before another one tripped the breaker.
            (Phase::Open { since }, _) => Phase::Open { since: *since },
        };
        *phase = next;
    }
}
