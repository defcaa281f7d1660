//! # Health Registry
//!
//! Named async health checks with per-check time budgets and an aggregated
//! status view. Checks are registered once at startup and run concurrently:
//! one failing or hanging check never prevents the others from running or
//! being reported.
//!
//! A check that misses its budget is reported as failed with a typed
//! [`VigilError::Timeout`]; its eventual completion is ignored
//! (fire-and-forget - the underlying operation is not cancelled).

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{Result, VigilError};

/// Overall status across all registered checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every check passed
    Healthy,
    /// Some checks passed, some failed
    Degraded,
    /// Every check failed
    Unhealthy,
    /// No checks registered
    Unknown,
}

/// Result of one check run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub healthy: bool,
    /// Failure reason; [`VigilError::Timeout`] when the budget was exceeded
    pub error: Option<VigilError>,
    pub duration_ms: u64,
    pub checked_at: DateTime<Utc>,
}

/// Aggregated output of [`HealthRegistry::run_all`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateReport {
    pub status: HealthStatus,
    pub total_checks: usize,
    pub healthy_checks: usize,
    pub checks: Vec<CheckResult>,
    pub checked_at: DateTime<Utc>,
}

type CheckFn = Box<dyn Fn() -> BoxFuture<'static, std::result::Result<(), String>> + Send + Sync>;

struct CheckEntry {
    name: String,
    timeout: Duration,
    check_fn: CheckFn,
    last: Mutex<Option<CheckResult>>,
}

/// Holds named async checks; runs them concurrently on demand
#[derive(Default)]
pub struct HealthRegistry {
    entries: RwLock<Vec<Arc<CheckEntry>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named check with its time budget.
    ///
    /// Names are unique keys; registering a duplicate is a configuration
    /// error. Checks are expected to be registered once at startup and are
    /// never removed during normal operation.
    pub fn register<F, Fut>(&self, name: impl Into<String>, timeout: Duration, check_fn: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<(), String>> + Send + 'static,
    {
        let name = name.into();
        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.name == name) {
            return Err(VigilError::Configuration(format!(
                "Health check '{name}' is already registered"
            )));
        }
        debug!(check = %name, timeout_ms = timeout.as_millis() as u64, "Health check registered");
        entries.push(Arc::new(CheckEntry {
            name,
            timeout,
            check_fn: Box::new(move || Box::pin(check_fn())),
            last: Mutex::new(None),
        }));
        Ok(())
    }

    /// Number of registered checks
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Last recorded result for a named check, if it has run
    pub fn last_result(&self, name: &str) -> Option<CheckResult> {
        let entries = self.entries.read();
        let entry = entries.iter().find(|e| e.name == name)?;
        let result = entry.last.lock().clone();
        result
    }

    /// Run every registered check concurrently and aggregate the results.
    ///
    /// Idempotent and side-effect-free beyond updating each check's last
    /// result and timestamp.
    pub async fn run_all(&self) -> AggregateReport {
        // Snapshot the entry list so no lock is held across the awaits
        let entries: Vec<Arc<CheckEntry>> = self.entries.read().clone();

        let runs = entries.iter().map(|entry| {
            let entry = Arc::clone(entry);
            async move {
                let started = Instant::now();
                let outcome = tokio::time::timeout(entry.timeout, (entry.check_fn)()).await;
                let duration_ms = started.elapsed().as_millis() as u64;

                let (healthy, error) = match outcome {
                    Ok(Ok(())) => (true, None),
                    Ok(Err(reason)) => {
                        (false, Some(VigilError::transient(entry.name.as_str(), reason)))
                    }
                    Err(_) => (
                        false,
                        Some(VigilError::Timeout {
                            check: entry.name.clone(),
                            budget: entry.timeout,
                        }),
                    ),
                };

                if let Some(reason) = &error {
                    warn!(check = %entry.name, reason = %reason, duration_ms, "Health check failed");
                }

                let result = CheckResult {
                    name: entry.name.clone(),
                    healthy,
                    error,
                    duration_ms,
                    checked_at: Utc::now(),
                };
                *entry.last.lock() = Some(result.clone());
                result
            }
        });

        let checks = join_all(runs).await;
        let healthy_checks = checks.iter().filter(|c| c.healthy).count();
        let status = match (checks.len(), healthy_checks) {
            (0, _) => HealthStatus::Unknown,
            (total, healthy) if healthy == total => HealthStatus::Healthy,
            (_, 0) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };

        AggregateReport {
            status,
            total_checks: checks.len(),
            healthy_checks,
            checks,
            checked_at: Utc::now(),
        }
    }
}
