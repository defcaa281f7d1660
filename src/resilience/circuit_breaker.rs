//! # Circuit Breaker Implementation
//!
//! Fault isolation for the external dependencies of a long-lived monitor
//! (the condition probe endpoint, the notification API). Follows the classic
//! three-state pattern: Closed (normal operation), Open (failing fast), and
//! HalfOpen (testing recovery with a single probe call).
//!
//! One breaker protects one external dependency; instances are created once
//! and live for the process lifetime.

use crate::config::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - a single probe call is allowed through
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            // Open is the safest interpretation of an unknown tag
            _ => CircuitState::Open,
        }
    }
}

/// Errors surfaced by a protected call
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open; the underlying operation was never invoked
    #[error("Circuit breaker is open for {component}, retry after {retry_after:?}")]
    CircuitOpen {
        component: String,
        retry_after: Duration,
    },

    /// The underlying operation ran and failed
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Counters and timing state guarded by the inner mutex.
#[derive(Debug, Default)]
struct BreakerInner {
    failure_count: u32,
    success_count: u64,
    total_requests: u64,
    last_failure_time: Option<Instant>,
    next_attempt_time: Option<Instant>,
    /// True while the single half-open probe call is in flight
    probe_in_flight: bool,
}

/// Serializable snapshot of breaker state for observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub component: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u64,
    pub total_requests: u64,
    /// Fraction of calls that failed (rejections included), 0.0 if none seen
    pub failure_rate: f64,
    /// Remaining cooldown before the next probe is allowed, when open
    pub retry_after: Option<Duration>,
}

/// Circuit breaker with an atomic state tag and mutex-guarded counters.
///
/// The state tag is readable lock-free; admission decisions and transitions
/// take the inner mutex so that the "exactly one half-open probe" rule holds
/// under concurrent callers. The mutex is never held across the protected
/// operation's await.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and status reports
    name: String,
    state: AtomicU8,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for the named dependency
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            open_timeout_ms = config.open_timeout().as_millis() as u64,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// Current circuit state (lock-free read)
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(retry_after) = self.admit().await {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
                retry_after,
            });
        }

        let result = operation().await;

        match &result {
            Ok(_) => self.record_success().await,
            Err(_) => self.record_failure().await,
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Snapshot of current counters and state
    pub async fn status(&self) -> CircuitBreakerStatus {
        let inner = self.inner.lock().await;
        // Rejected calls count as failures for rate purposes
        let failure_rate = if inner.total_requests > 0 {
            (inner.total_requests - inner.success_count) as f64 / inner.total_requests as f64
        } else {
            0.0
        };
        let retry_after = inner
            .next_attempt_time
            .map(|t| t.saturating_duration_since(Instant::now()))
            .filter(|d| !d.is_zero());

        CircuitBreakerStatus {
            component: self.name.clone(),
            state: self.state(),
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_requests: inner.total_requests,
            failure_rate,
            retry_after,
        }
    }

    /// Decide whether a call may proceed.
    ///
    /// Returns `None` to admit the call, or `Some(retry_after)` to reject it.
    /// Every call attempt is counted, rejected or not.
    async fn admit(&self) -> Option<Duration> {
        let mut inner = self.inner.lock().await;
        inner.total_requests += 1;

        match self.state() {
            CircuitState::Closed => None,
            CircuitState::Open => {
                let next_attempt = inner.next_attempt_time?;
                let now = Instant::now();
                if now >= next_attempt {
                    // Cooldown elapsed: move to half-open and admit this
                    // call as the single probe
                    self.state
                        .store(CircuitState::HalfOpen as u8, Ordering::Release);
                    inner.probe_in_flight = true;
                    info!(component = %self.name, "🟡 Circuit breaker half-open (testing recovery)");
                    None
                } else {
                    Some(next_attempt - now)
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    // A probe is already in flight; reject until it settles
                    let retry_after = inner
                        .next_attempt_time
                        .map(|t| t.saturating_duration_since(Instant::now()))
                        .unwrap_or_default();
                    Some(retry_after)
                } else {
                    inner.probe_in_flight = true;
                    None
                }
            }
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.success_count += 1;

        match self.state() {
            CircuitState::HalfOpen => {
                inner.failure_count = 0;
                inner.probe_in_flight = false;
                inner.next_attempt_time = None;
                self.state
                    .store(CircuitState::Closed as u8, Ordering::Release);
                info!(
                    component = %self.name,
                    total_requests = inner.total_requests,
                    "🟢 Circuit breaker closed (recovered)"
                );
            }
            CircuitState::Closed => {
                // Consecutive-failure counting: any success resets the run
                inner.failure_count = 0;
            }
            CircuitState::Open => {
                warn!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());

        debug!(
            component = %self.name,
            failure_count = inner.failure_count,
            "🔴 Protected operation failed"
        );

        match self.state() {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                // The probe failed: re-open with a fresh cooldown
                inner.probe_in_flight = false;
                self.open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self, inner: &mut BreakerInner) {
        inner.next_attempt_time = Some(Instant::now() + self.config.open_timeout());
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        warn!(
            component = %self.name,
            failure_count = inner.failure_count,
            failure_threshold = self.config.failure_threshold,
            open_timeout_ms = self.config.open_timeout().as_millis() as u64,
            "🔴 Circuit breaker opened (failing fast)"
        );
    }
}
