//! # Error Taxonomy
//!
//! Crate-wide error types for the resilience and coordination layer.
//!
//! Every failure path in this crate is non-fatal to the host process: each
//! variant is a typed outcome the caller can match on to decide whether to
//! retry, skip, or surface the failure externally. Component-local generic
//! errors (`RetryError<E>`, `CircuitBreakerError<E>`) convert into this
//! taxonomy at the workflow layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for all vigil-core operations.
///
/// Serializable so errors embedded in status snapshots (health check
/// results, delivery failure records) survive the trip to a host endpoint.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum VigilError {
    /// Transient failure (network/API errors) - eligible for retry
    #[error("Transient failure in {context}: {message}")]
    Transient { context: String, message: String },

    /// Operation declined because the mutual-exclusion gate was held
    #[error("Operation '{operation}' rejected: already in progress")]
    ConcurrencyRejected { operation: String },

    /// Operation declined because the circuit breaker is open
    #[error("Circuit breaker is open for {component}, retry after {retry_after:?}")]
    CircuitOpen {
        component: String,
        retry_after: Duration,
    },

    /// Delivery queue item exhausted its attempts
    #[error("Delivery of '{descriptor}' permanently failed after {attempts} attempts")]
    PermanentDeliveryFailure { descriptor: String, attempts: u32 },

    /// Health check exceeded its time budget
    #[error("Health check '{check}' timed out after {budget:?}")]
    Timeout { check: String, budget: Duration },

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl VigilError {
    /// Convenience constructor for transient failures
    pub fn transient(context: impl Into<String>, message: impl Into<String>) -> Self {
        VigilError::Transient {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Whether this error is eligible for retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VigilError::Transient { .. } | VigilError::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, VigilError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability_by_variant() {
        assert!(VigilError::transient("probe", "connection reset").is_retryable());
        assert!(VigilError::Timeout {
            check: "probe".to_string(),
            budget: Duration::from_secs(5),
        }
        .is_retryable());
        assert!(!VigilError::ConcurrencyRejected {
            operation: "check".to_string(),
        }
        .is_retryable());
        assert!(!VigilError::Configuration("bad threshold".to_string()).is_retryable());
    }

    #[test]
    fn test_display_messages() {
        let err = VigilError::CircuitOpen {
            component: "notifier".to_string(),
            retry_after: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("notifier"));

        let err = VigilError::PermanentDeliveryFailure {
            descriptor: "alert:became-available".to_string(),
            attempts: 3,
        };
        assert!(err.to_string().contains("3 attempts"));
    }
}
