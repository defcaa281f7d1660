//! # Resilience Primitives
//!
//! Fault tolerance building blocks for the monitor's external dependencies:
//! bounded retry with exponential backoff and a circuit breaker that fails
//! fast once a dependency is known to be down.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vigil_core::config::{CircuitBreakerConfig, RetryConfig};
//! use vigil_core::resilience::{CircuitBreaker, RetryExecutor};
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new("condition_probe", CircuitBreakerConfig::default());
//! let retry = RetryExecutor::new(RetryConfig::default());
//!
//! let result = breaker
//!     .call(|| retry.execute("fetch", || async { Ok::<_, String>("up") }))
//!     .await;
//! # let _ = result;
//! # }
//! ```

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitBreakerStatus, CircuitState};
pub use retry::{AttemptFailure, FailureCategory, RetryError, RetryExecutor};
