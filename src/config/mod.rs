//! # Configuration System
//!
//! Explicit, validated configuration for every component in the core. Hosts
//! construct a [`CoreConfig`] directly, deserialize one from YAML, or load it
//! through [`loader::load_from_file`] which also applies `${ENV_VAR}`
//! substitution. There are no silent fallbacks: invalid values fail
//! validation with a [`VigilError::Configuration`] error.
//!
//! Durations are declared as millisecond integers in the serialized form and
//! exposed as `Duration` through accessors.

pub mod loader;

use crate::error::{Result, VigilError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of invocations, first attempt included
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay_ms: u64,
    /// Upper bound on any single backoff delay
    pub max_delay_ms: u64,
    /// Multiplier applied per failed attempt
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Circuit breaker settings, one instance per protected dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a probe call
    pub open_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_ms: 60_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

/// Delivery queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Queue capacity; enqueueing beyond it evicts the oldest item
    pub max_queue_size: usize,
    /// Delivery attempts per item before it is permanently dropped
    pub max_attempts: u32,
    /// Pause between items during a drain pass (outbound rate throttle)
    pub item_delay_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 100,
            max_attempts: 3,
            item_delay_ms: 250,
        }
    }
}

impl DeliveryConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }
}

/// How the report workflow picks the calendar date(s) to report on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportDating {
    /// Report on "yesterday" at invocation time. A process that stays down
    /// across a date boundary silently skips the missed dates (the original
    /// system's behavior).
    PreviousDay,
    /// Walk every unreported date between the last sent report and
    /// yesterday, sending one report per missed date.
    CatchUp,
}

/// Report workflow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub dating: ReportDating,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dating: ReportDating::PreviousDay,
        }
    }
}

/// Aggregate configuration for the whole core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub delivery: DeliveryConfig,
    pub report: ReportConfig,
}

impl CoreConfig {
    /// Validate every section, rejecting values that would break component
    /// invariants (zero attempts, shrinking backoff, empty queue)
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(VigilError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_factor < 1.0 {
            return Err(VigilError::Configuration(format!(
                "retry.backoff_factor must be >= 1.0, got {}",
                self.retry.backoff_factor
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(VigilError::Configuration(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(VigilError::Configuration(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.delivery.max_queue_size == 0 {
            return Err(VigilError::Configuration(
                "delivery.max_queue_size must be at least 1".to_string(),
            ));
        }
        if self.delivery.max_attempts == 0 {
            return Err(VigilError::Configuration(
                "delivery.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
