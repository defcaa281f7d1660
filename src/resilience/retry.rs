//! # Retry Executor
//!
//! Bounded retry with exponential backoff for transient failures against
//! external endpoints. Backoff waits are cooperative (`tokio::time::sleep`),
//! so a retrying workflow never stalls the rest of the process.
//!
//! The executor does not log business outcomes itself beyond tracing events:
//! every failed attempt produces a structured [`AttemptFailure`] record that
//! travels back to the caller inside [`RetryError`], and the host decides how
//! to render or persist it.

use crate::config::RetryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Structured record of one failed attempt, produced for external logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptFailure {
    /// Failure category for downstream classification
    pub category: FailureCategory,
    /// Caller-supplied context (operation name)
    pub context: String,
    /// 1-based attempt number
    pub attempt: u32,
    /// Delay before the next attempt; `None` on the final attempt
    pub next_delay: Option<Duration>,
    /// Rendered error message
    pub error: String,
}

/// Coarse failure classification carried on attempt records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCategory {
    /// Network/API error expected to clear on its own
    Transient,
    /// The operation exceeded a time budget
    Timeout,
}

/// Error returned once all attempts are exhausted
#[derive(Debug, thiserror::Error)]
#[error("Operation '{context}' failed after {attempts} attempts: {error}")]
pub struct RetryError<E: fmt::Display + fmt::Debug> {
    /// The final attempt's error
    pub error: E,
    /// How many times the operation was invoked
    pub attempts: u32,
    /// True when the attempt budget was fully spent
    pub exhausted: bool,
    /// One record per failed attempt, in order
    pub failures: Vec<AttemptFailure>,
    pub context: String,
}

/// Runs operations up to a bounded number of attempts with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before attempt `k + 1`, where `k` is the 1-based attempt that
    /// just failed: `min(base_delay * backoff_factor^(k-1), max_delay)`
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let factor = self.config.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let delay_ms = self.config.base_delay().as_millis() as f64 * factor;
        Duration::from_millis(delay_ms as u64).min(self.config.max_delay())
    }

    /// Execute `operation` up to `max_attempts` times.
    ///
    /// Returns the first success immediately. On exhaustion, returns a
    /// [`RetryError`] carrying the final error, the attempt count, and the
    /// per-attempt failure records.
    pub async fn execute<F, Fut, T, E>(
        &self,
        context: &str,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display + fmt::Debug,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut failures = Vec::new();

        for attempt in 1..=max_attempts {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            context = %context,
                            attempt,
                            "🟢 Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let is_final = attempt == max_attempts;
                    let next_delay = (!is_final).then(|| self.delay_after_attempt(attempt));

                    let failure = AttemptFailure {
                        category: FailureCategory::Transient,
                        context: context.to_string(),
                        attempt,
                        next_delay,
                        error: err.to_string(),
                    };

                    warn!(
                        context = %context,
                        attempt,
                        max_attempts,
                        category = ?failure.category,
                        next_delay_ms = next_delay.map(|d| d.as_millis() as u64),
                        error = %err,
                        "🔁 Attempt failed"
                    );

                    failures.push(failure);

                    if is_final {
                        return Err(RetryError {
                            error: err,
                            attempts: attempt,
                            exhausted: true,
                            failures,
                            context: context.to_string(),
                        });
                    }

                    // Unwrap is safe: next_delay is Some on non-final attempts
                    tokio::time::sleep(next_delay.unwrap_or_default()).await;
                }
            }
        }

        unreachable!("loop returns on final attempt")
    }
}
