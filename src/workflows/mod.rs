//! # Scheduled Workflows
//!
//! The two entry points an external scheduler invokes: the periodic
//! condition check and the periodic report. Both compose the coordinator,
//! retry executor, circuit breaker, and delivery queue, and both return
//! structured outcomes instead of logging business results - the host
//! decides how to render them.
//!
//! ## Collaborator contracts
//!
//! Everything excluded from this core (HTTP scraping, storage formats,
//! email rendering and transport) sits behind the narrow traits here:
//! [`ConditionProbe`], [`CheckRecordStore`], [`DeliverySink`], and
//! [`ContentComposer`].
//!
//! ## Control flow (check)
//!
//! ```text
//! scheduler ──▶ CheckWorkflow::run
//!               ├─ try_enter_check ── held? ──▶ Skipped (carries ConcurrencyRejected, non-fatal)
//!               ├─ probe via CircuitBreaker(RetryExecutor(probe))
//!               ├─ update_condition ──▶ transition?
//!               ├─ append CheckRecord
//!               ├─ release gate (guard, covers error paths)
//!               └─ transition ──▶ enqueue alert + kick drain
//! ```

use crate::coordinator::{ApplicationStateCoordinator, ConditionTransition};
use crate::delivery::DeliveryQueue;
use crate::error::VigilError;
use crate::resilience::{CircuitBreaker, CircuitBreakerError, RetryExecutor};
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ReportDating;

/// One observation of the monitored external resource
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConditionSample {
    pub value: bool,
    pub observed_at: DateTime<Utc>,
}

/// Durable record of one check, successful or not
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecord {
    /// Observed condition; `None` when the probe failed
    pub condition: Option<bool>,
    pub observed_at: DateTime<Utc>,
    pub error: Option<String>,
    /// Identifier of the monitored resource
    pub source: String,
}

/// Already-rendered notification content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryPayload {
    /// Short identifier for logs and failure records
    pub descriptor: String,
    pub subject: String,
    pub body: String,
}

/// Probes the monitored external resource (HTTP fetch + inspection live
/// behind this seam)
#[async_trait]
pub trait ConditionProbe: Send + Sync {
    async fn probe(&self) -> Result<ConditionSample, VigilError>;
}

/// Appends and reads back durable check records
#[async_trait]
pub trait CheckRecordStore: Send + Sync {
    async fn append(&self, record: &CheckRecord) -> Result<(), VigilError>;

    /// Records observed in `[from, to)`
    async fn records_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckRecord>, VigilError>;
}

/// Delivers already-rendered content (email, webhook, ...)
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, payload: &DeliveryPayload) -> Result<(), VigilError>;
}

/// Renders notification content; templating lives behind this seam
pub trait ContentComposer: Send + Sync {
    fn compose_alert(&self, transition: &ConditionTransition) -> DeliveryPayload;
    fn compose_report(&self, date: NaiveDate, records: &[CheckRecord]) -> DeliveryPayload;
}

/// Outcome of one check workflow invocation; all variants are non-fatal
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Another check was already in progress; this invocation was a no-op.
    /// Carries the typed rejection so hosts that surface errors can do so
    /// without treating the skip as fatal.
    Skipped { error: VigilError },
    /// The probe succeeded and state was updated
    Completed {
        transition: ConditionTransition,
        alert_enqueued: bool,
    },
    /// The probe failed after retries, or the breaker rejected it
    ProbeFailed { error: VigilError },
}

/// Outcome of one report workflow invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    /// Every candidate date already had its report sent
    AlreadySent { date: NaiveDate },
    /// Reports were delivered and marked for these dates
    Sent { dates: Vec<NaiveDate> },
    /// Delivery failed for `date`; it stays unmarked for the next run
    Failed { date: NaiveDate, error: VigilError },
}

/// The periodic check: probe, record, detect transitions, alert
pub struct CheckWorkflow {
    coordinator: Arc<ApplicationStateCoordinator>,
    probe: Arc<dyn ConditionProbe>,
    store: Arc<dyn CheckRecordStore>,
    composer: Arc<dyn ContentComposer>,
    alert_sink: Arc<dyn DeliverySink>,
    queue: Arc<DeliveryQueue>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    source: String,
}

impl CheckWorkflow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        coordinator: Arc<ApplicationStateCoordinator>,
        probe: Arc<dyn ConditionProbe>,
        store: Arc<dyn CheckRecordStore>,
        composer: Arc<dyn ContentComposer>,
        alert_sink: Arc<dyn DeliverySink>,
        queue: Arc<DeliveryQueue>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryExecutor,
        source: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            probe,
            store,
            composer,
            alert_sink,
            queue,
            breaker,
            retry,
            source: source.into(),
        }
    }

    /// Run one check. Overlapping invocations are rejected, not queued: a
    /// slow or hung check must not cause a backlog of concurrent checks.
    pub async fn run(&self) -> CheckOutcome {
        let Some(guard) = self.coordinator.enter_check_scope() else {
            info!("Check already in progress, skipping this trigger");
            return CheckOutcome::Skipped {
                error: VigilError::ConcurrencyRejected {
                    operation: "check".to_string(),
                },
            };
        };

        let probe_result = self
            .breaker
            .call(|| {
                self.retry
                    .execute("condition_probe", || self.probe.probe())
            })
            .await;

        let outcome = match probe_result {
            Ok(sample) => {
                let transition = self
                    .coordinator
                    .update_condition(sample.value, sample.observed_at);
                self.append_record(CheckRecord {
                    condition: Some(sample.value),
                    observed_at: sample.observed_at,
                    error: None,
                    source: self.source.clone(),
                })
                .await;
                CheckOutcome::Completed {
                    transition,
                    alert_enqueued: transition.changed(),
                }
            }
            Err(err) => {
                let error = match err {
                    CircuitBreakerError::CircuitOpen {
                        component,
                        retry_after,
                    } => VigilError::CircuitOpen {
                        component,
                        retry_after,
                    },
                    CircuitBreakerError::OperationFailed(retry_err) => VigilError::transient(
                        "condition_probe",
                        format!(
                            "{} (after {} attempts)",
                            retry_err.error, retry_err.attempts
                        ),
                    ),
                };
                self.append_record(CheckRecord {
                    condition: None,
                    observed_at: Utc::now(),
                    error: Some(error.to_string()),
                    source: self.source.clone(),
                })
                .await;
                CheckOutcome::ProbeFailed { error }
            }
        };

        // Release the gate before any delivery waits; the queue throttles
        // itself and must not extend the check's critical section
        drop(guard);

        if let CheckOutcome::Completed {
            transition,
            alert_enqueued: true,
        } = &outcome
        {
            let payload = self.composer.compose_alert(transition);
            info!(descriptor = %payload.descriptor, "🔔 Condition changed, alert queued");
            self.queue
                .enqueue(payload, Arc::clone(&self.alert_sink))
                .await;
            self.queue.drain().await;
        }

        outcome
    }

    /// Record persistence is best-effort; a storage failure downgrades to a
    /// log entry rather than failing the check
    async fn append_record(&self, record: CheckRecord) {
        if let Err(err) = self.store.append(&record).await {
            warn!(error = %err, "Failed to persist check record");
        }
    }
}

/// The periodic report: read back a day's records, compose, deliver once
pub struct ReportWorkflow {
    coordinator: Arc<ApplicationStateCoordinator>,
    store: Arc<dyn CheckRecordStore>,
    composer: Arc<dyn ContentComposer>,
    report_sink: Arc<dyn DeliverySink>,
    retry: RetryExecutor,
    dating: ReportDating,
}

impl ReportWorkflow {
    pub fn new(
        coordinator: Arc<ApplicationStateCoordinator>,
        store: Arc<dyn CheckRecordStore>,
        composer: Arc<dyn ContentComposer>,
        report_sink: Arc<dyn DeliverySink>,
        retry: RetryExecutor,
        dating: ReportDating,
    ) -> Self {
        Self {
            coordinator,
            store,
            composer,
            report_sink,
            retry,
            dating,
        }
    }

    /// Run the report for the date(s) owed as of `now`.
    ///
    /// At most one report is ever delivered per calendar date, however many
    /// times the scheduler fires (double-fires, restarts near the boundary).
    /// A report is marked sent only after its delivery succeeded.
    pub async fn run(&self, now: DateTime<Utc>) -> ReportOutcome {
        let yesterday = match now.date_naive().checked_sub_days(Days::new(1)) {
            Some(date) => date,
            None => {
                // Unreachable with real clocks; nothing is owed
                return ReportOutcome::AlreadySent {
                    date: now.date_naive(),
                };
            }
        };

        let candidates = self.candidate_dates(yesterday);
        let mut sent = Vec::new();

        for date in candidates {
            if self.coordinator.is_report_sent(date) {
                continue;
            }

            if let Err(error) = self.send_report_for(date).await {
                warn!(report_date = %date, error = %error, "Report delivery failed");
                return ReportOutcome::Failed { date, error };
            }
            self.coordinator.mark_report_sent(date);
            sent.push(date);
        }

        if sent.is_empty() {
            ReportOutcome::AlreadySent { date: yesterday }
        } else {
            ReportOutcome::Sent { dates: sent }
        }
    }

    /// Dates owed as of `yesterday`, oldest first
    fn candidate_dates(&self, yesterday: NaiveDate) -> Vec<NaiveDate> {
        match self.dating {
            ReportDating::PreviousDay => vec![yesterday],
            ReportDating::CatchUp => {
                let start = self
                    .coordinator
                    .snapshot()
                    .last_report_date
                    .and_then(|last| last.checked_add_days(Days::new(1)))
                    .unwrap_or(yesterday);
                let mut dates = Vec::new();
                let mut date = start;
                while date <= yesterday {
                    dates.push(date);
                    match date.checked_add_days(Days::new(1)) {
                        Some(next) => date = next,
                        None => break,
                    }
                }
                dates
            }
        }
    }

    async fn send_report_for(&self, date: NaiveDate) -> Result<(), VigilError> {
        let from = date.and_time(chrono::NaiveTime::MIN).and_utc();
        let to = from + chrono::Duration::days(1);

        let records = self.store.records_between(from, to).await?;
        let payload = self.composer.compose_report(date, &records);

        info!(
            report_date = %date,
            record_count = records.len(),
            descriptor = %payload.descriptor,
            "📊 Sending periodic report"
        );

        self.retry
            .execute("report_delivery", || self.report_sink.deliver(&payload))
            .await
            .map_err(|err| {
                VigilError::transient(
                    "report_delivery",
                    format!("{} (after {} attempts)", err.error, err.attempts),
                )
            })?;
        Ok(())
    }
}
