//! # Application State Coordinator
//!
//! Process-wide state for the monitor: the last observed condition, the
//! check-in-progress gate, the last-report date, and counters. One instance
//! is constructed per process and passed explicitly to the workflows that
//! need it; there is no implicit global.
//!
//! ## Concurrency model
//!
//! The in-progress gate is an `AtomicBool` compare-and-swap: for any number
//! of concurrent [`try_enter_check`](ApplicationStateCoordinator::try_enter_check)
//! calls, exactly one wins. There is no check-then-set window and no polling.
//! The remaining state sits behind a `parking_lot::Mutex` held only for the
//! synchronous mutation, never across an await, so condition updates are
//! linearized: each `update_condition` fully completes (including the
//! `check_count` increment) before the next begins.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Read-only snapshot of the coordinator's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationState {
    /// Last known result of the monitored check; `None` until the first
    /// successful probe
    pub last_observed_condition: Option<bool>,
    pub last_check_time: Option<DateTime<Utc>>,
    /// True only while a check workflow holds the gate
    pub check_in_progress: bool,
    /// Calendar date of the most recently sent periodic report. Never reset
    /// in-process; only a restart clears it.
    pub last_report_date: Option<NaiveDate>,
    /// Incremented by exactly 1 per successful condition update
    pub check_count: u64,
    pub last_state_update: DateTime<Utc>,
}

/// Result of a condition update, returned so the caller can detect a
/// transition without a second (racy) read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionTransition {
    pub previous: Option<bool>,
    pub current: bool,
}

impl ConditionTransition {
    /// True when a previously known condition flipped
    pub fn changed(&self) -> bool {
        match self.previous {
            Some(previous) => previous != self.current,
            None => false,
        }
    }
}

#[derive(Debug)]
struct StateInner {
    last_observed_condition: Option<bool>,
    last_check_time: Option<DateTime<Utc>>,
    last_report_date: Option<NaiveDate>,
    check_count: u64,
    last_state_update: DateTime<Utc>,
}

/// Owner of the single shared [`ApplicationState`]; all access goes through
/// its methods
#[derive(Debug)]
pub struct ApplicationStateCoordinator {
    /// Mutual-exclusion gate for the check workflow
    check_in_progress: AtomicBool,
    inner: Mutex<StateInner>,
}

impl Default for ApplicationStateCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationStateCoordinator {
    pub fn new() -> Self {
        Self {
            check_in_progress: AtomicBool::new(false),
            inner: Mutex::new(StateInner {
                last_observed_condition: None,
                last_check_time: None,
                last_report_date: None,
                check_count: 0,
                last_state_update: Utc::now(),
            }),
        }
    }

    /// Attempt to take the check-in-progress gate.
    ///
    /// Returns `false` immediately (no blocking, no waiting) when another
    /// check already holds it. A `true` return must be paired with exactly
    /// one [`exit_check`](Self::exit_check); prefer
    /// [`enter_check_scope`](Self::enter_check_scope) for automatic release.
    pub fn try_enter_check(&self) -> bool {
        let entered = self
            .check_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if entered {
            self.inner.lock().last_state_update = Utc::now();
            debug!("Check gate acquired");
        } else {
            debug!("Check gate held, rejecting overlapping check");
        }
        entered
    }

    /// Release the check-in-progress gate
    pub fn exit_check(&self) {
        self.check_in_progress.store(false, Ordering::Release);
        self.inner.lock().last_state_update = Utc::now();
        debug!("Check gate released");
    }

    /// Take the gate with scoped release: the returned guard calls
    /// [`exit_check`](Self::exit_check) on drop, covering error paths
    pub fn enter_check_scope(&self) -> Option<CheckGuard<'_>> {
        self.try_enter_check()
            .then(|| CheckGuard { coordinator: self })
    }

    /// Record a newly observed condition.
    ///
    /// Returns the prior and new condition in one atomic step so the caller
    /// can fire a transition alert without a read-modify race.
    pub fn update_condition(&self, value: bool, at: DateTime<Utc>) -> ConditionTransition {
        let mut inner = self.inner.lock();
        let previous = inner.last_observed_condition;
        inner.last_observed_condition = Some(value);
        inner.last_check_time = Some(at);
        inner.check_count += 1;
        inner.last_state_update = Utc::now();

        let transition = ConditionTransition {
            previous,
            current: value,
        };
        if transition.changed() {
            info!(
                previous = ?previous,
                current = value,
                check_count = inner.check_count,
                "🔄 Monitored condition changed"
            );
        }
        transition
    }

    /// Whether a periodic report has already been sent for `date`
    pub fn is_report_sent(&self, date: NaiveDate) -> bool {
        self.inner.lock().last_report_date.map_or(false, |d| d >= date)
    }

    /// Record that the report for `date` was delivered. Monotonic: an
    /// earlier date never overwrites a later one.
    pub fn mark_report_sent(&self, date: NaiveDate) {
        let mut inner = self.inner.lock();
        if inner.last_report_date.map_or(true, |d| date > d) {
            inner.last_report_date = Some(date);
        }
        inner.last_state_update = Utc::now();
        info!(report_date = %date, "📬 Report marked as sent");
    }

    /// Read-only copy of the full state
    pub fn snapshot(&self) -> ApplicationState {
        let inner = self.inner.lock();
        ApplicationState {
            last_observed_condition: inner.last_observed_condition,
            last_check_time: inner.last_check_time,
            check_in_progress: self.check_in_progress.load(Ordering::Acquire),
            last_report_date: inner.last_report_date,
            check_count: inner.check_count,
            last_state_update: inner.last_state_update,
        }
    }
}

/// RAII guard for the check gate; releases on drop
#[derive(Debug)]
pub struct CheckGuard<'a> {
    coordinator: &'a ApplicationStateCoordinator,
}

impl Drop for CheckGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.exit_check();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_is_exclusive() {
        let coordinator = ApplicationStateCoordinator::new();
        assert!(coordinator.try_enter_check());
        assert!(!coordinator.try_enter_check());
        coordinator.exit_check();
        assert!(coordinator.try_enter_check());
        coordinator.exit_check();
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let coordinator = ApplicationStateCoordinator::new();
        {
            let _guard = coordinator.enter_check_scope().unwrap();
            assert!(coordinator.enter_check_scope().is_none());
            assert!(coordinator.snapshot().check_in_progress);
        }
        assert!(!coordinator.snapshot().check_in_progress);
    }

    #[test]
    fn test_guard_releases_on_panic_path() {
        let coordinator = ApplicationStateCoordinator::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = coordinator.enter_check_scope().unwrap();
            panic!("check blew up");
        }));
        assert!(result.is_err());
        assert!(!coordinator.snapshot().check_in_progress);
    }

    #[test]
    fn test_update_condition_reports_transition() {
        let coordinator = ApplicationStateCoordinator::new();
        let t1 = Utc::now();

        let first = coordinator.update_condition(false, t1);
        assert_eq!(first.previous, None);
        assert!(!first.changed());

        let second = coordinator.update_condition(true, Utc::now());
        assert_eq!(second.previous, Some(false));
        assert!(second.current);
        assert!(second.changed());

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.check_count, 2);
        assert_eq!(snapshot.last_observed_condition, Some(true));
    }

    #[test]
    fn test_check_count_increments_per_update() {
        let coordinator = ApplicationStateCoordinator::new();
        for i in 1..=5 {
            coordinator.update_condition(true, Utc::now());
            assert_eq!(coordinator.snapshot().check_count, i);
        }
    }

    #[test]
    fn test_report_idempotence() {
        let coordinator = ApplicationStateCoordinator::new();
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();

        assert!(!coordinator.is_report_sent(date));
        coordinator.mark_report_sent(date);
        assert!(coordinator.is_report_sent(date));
        // Repeat marks are harmless
        coordinator.mark_report_sent(date);
        assert!(coordinator.is_report_sent(date));
        // Earlier dates are covered by a later report mark
        assert!(coordinator.is_report_sent(date.pred_opt().unwrap()));
        assert!(!coordinator.is_report_sent(date.succ_opt().unwrap()));
    }

    #[test]
    fn test_mark_report_sent_is_monotonic() {
        let coordinator = ApplicationStateCoordinator::new();
        let later = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let earlier = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();

        coordinator.mark_report_sent(later);
        coordinator.mark_report_sent(earlier);
        assert_eq!(coordinator.snapshot().last_report_date, Some(later));
    }
}
