//! End-to-end behavior of the check and report workflows: mutual exclusion,
//! transition alerting, and once-per-date report delivery.

mod common;

use chrono::{TimeZone, Utc};
use common::{CountingSink, MemoryStore, PlainComposer, ScriptedProbe};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use vigil_core::config::{
    CircuitBreakerConfig, DeliveryConfig, ReportDating, RetryConfig,
};
use vigil_core::coordinator::ApplicationStateCoordinator;
use vigil_core::delivery::DeliveryQueue;
use vigil_core::error::VigilError;
use vigil_core::resilience::{CircuitBreaker, RetryExecutor};
use vigil_core::workflows::{CheckOutcome, CheckWorkflow, ReportOutcome, ReportWorkflow};

fn fast_retry() -> RetryExecutor {
    RetryExecutor::new(RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
        backoff_factor: 2.0,
    })
}

fn check_workflow(
    coordinator: Arc<ApplicationStateCoordinator>,
    probe: Arc<ScriptedProbe>,
    store: Arc<MemoryStore>,
    sink: Arc<CountingSink>,
) -> CheckWorkflow {
    let queue = Arc::new(DeliveryQueue::new(DeliveryConfig {
        max_queue_size: 10,
        max_attempts: 3,
        item_delay_ms: 0,
    }));
    let breaker = Arc::new(CircuitBreaker::new(
        "condition_probe",
        CircuitBreakerConfig {
            failure_threshold: 5,
            open_timeout_ms: 60_000,
        },
    ));
    CheckWorkflow::new(
        coordinator,
        probe,
        store,
        Arc::new(PlainComposer),
        sink,
        queue,
        breaker,
        fast_retry(),
        "status-page",
    )
}

#[test]
fn concurrent_try_enter_check_admits_exactly_one() {
    let coordinator = Arc::new(ApplicationStateCoordinator::new());
    let n = 16;
    let barrier = Arc::new(std::sync::Barrier::new(n));

    let handles: Vec<_> = (0..n)
        .map(|_| {
            let coordinator = coordinator.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                coordinator.try_enter_check()
            })
        })
        .collect();

    let admitted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&entered| entered)
        .count();
    assert_eq!(admitted, 1);

    coordinator.exit_check();
    assert!(coordinator.try_enter_check());
}

#[tokio::test]
async fn overlapping_check_runs_are_skipped_not_queued() {
    let coordinator = Arc::new(ApplicationStateCoordinator::new());
    let probe =
        Arc::new(ScriptedProbe::new(vec![Ok(true), Ok(true)]).with_delay(Duration::from_millis(80)));
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CountingSink::new());
    let workflow = Arc::new(check_workflow(coordinator, probe.clone(), store, sink));

    let slow = tokio::spawn({
        let workflow = workflow.clone();
        async move { workflow.run().await }
    });
    // Let the first run take the gate and park in the probe
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = workflow.run().await;
    match second {
        CheckOutcome::Skipped { error } => {
            assert_eq!(
                error,
                VigilError::ConcurrencyRejected {
                    operation: "check".to_string(),
                }
            );
            assert!(!error.is_retryable());
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let first = slow.await.unwrap();
    assert!(matches!(first, CheckOutcome::Completed { .. }));
    // The skipped run never reached the probe
    assert_eq!(probe.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn condition_transition_fires_one_alert() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .try_init();

    let coordinator = Arc::new(ApplicationStateCoordinator::new());
    let probe = Arc::new(ScriptedProbe::new(vec![Ok(false), Ok(true), Ok(true)]));
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CountingSink::new());
    let workflow = check_workflow(coordinator.clone(), probe, store.clone(), sink.clone());

    // First observation: no previous condition, no alert
    let first = workflow.run().await;
    match first {
        CheckOutcome::Completed {
            transition,
            alert_enqueued,
        } => {
            assert_eq!(transition.previous, None);
            assert!(!alert_enqueued);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    // false -> true: exactly one "became available" alert
    let second = workflow.run().await;
    match second {
        CheckOutcome::Completed {
            transition,
            alert_enqueued,
        } => {
            assert_eq!(transition.previous, Some(false));
            assert!(transition.current);
            assert!(alert_enqueued);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    // true -> true: steady state, no further alert
    let third = workflow.run().await;
    assert!(matches!(
        third,
        CheckOutcome::Completed {
            alert_enqueued: false,
            ..
        }
    ));

    assert_eq!(
        sink.delivered_descriptors(),
        vec!["alert:became-available"]
    );
    assert_eq!(coordinator.snapshot().check_count, 3);
    assert_eq!(store.records().len(), 3);
}

#[tokio::test]
async fn probe_failure_is_recorded_and_non_fatal() {
    let coordinator = Arc::new(ApplicationStateCoordinator::new());
    // All three retry attempts fail
    let probe = Arc::new(ScriptedProbe::new(vec![
        Err("503".to_string()),
        Err("503".to_string()),
        Err("503".to_string()),
        Ok(true),
    ]));
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CountingSink::new());
    let workflow = check_workflow(coordinator.clone(), probe, store.clone(), sink);

    let outcome = workflow.run().await;
    assert!(matches!(outcome, CheckOutcome::ProbeFailed { .. }));

    // The failure was recorded, condition state is untouched, and the gate
    // was released so the next run proceeds
    let records = store.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].condition.is_none());
    assert!(records[0].error.is_some());
    assert_eq!(coordinator.snapshot().check_count, 0);
    assert!(!coordinator.snapshot().check_in_progress);

    let next = workflow.run().await;
    assert!(matches!(next, CheckOutcome::Completed { .. }));
}

#[tokio::test]
async fn daily_report_is_sent_once_per_date() {
    let coordinator = Arc::new(ApplicationStateCoordinator::new());
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CountingSink::new());
    let workflow = ReportWorkflow::new(
        coordinator.clone(),
        store,
        Arc::new(PlainComposer),
        sink.clone(),
        fast_retry(),
        ReportDating::PreviousDay,
    );

    let now = Utc.with_ymd_and_hms(2025, 3, 15, 8, 0, 0).unwrap();
    let yesterday = now.date_naive().pred_opt().unwrap();

    let first = workflow.run(now).await;
    assert_eq!(
        first,
        ReportOutcome::Sent {
            dates: vec![yesterday]
        }
    );

    // Scheduler double-fire: same date, no second delivery
    let second = workflow.run(now).await;
    assert_eq!(second, ReportOutcome::AlreadySent { date: yesterday });
    assert_eq!(sink.delivered_descriptors(), vec!["report:2025-03-14"]);

    assert!(coordinator.is_report_sent(yesterday));
    assert_eq!(coordinator.snapshot().last_report_date, Some(yesterday));
}

#[tokio::test]
async fn failed_report_delivery_stays_unmarked_for_the_next_run() {
    let coordinator = Arc::new(ApplicationStateCoordinator::new());
    let store = Arc::new(MemoryStore::new());
    // Fail the first full retry cycle (3 attempts), then recover
    let sink = Arc::new(CountingSink::failing_first(3));
    let workflow = ReportWorkflow::new(
        coordinator.clone(),
        store,
        Arc::new(PlainComposer),
        sink.clone(),
        fast_retry(),
        ReportDating::PreviousDay,
    );

    let now = Utc.with_ymd_and_hms(2025, 3, 15, 8, 0, 0).unwrap();
    let yesterday = now.date_naive().pred_opt().unwrap();

    let first = workflow.run(now).await;
    assert!(matches!(first, ReportOutcome::Failed { date, .. } if date == yesterday));
    assert!(!coordinator.is_report_sent(yesterday));

    let second = workflow.run(now).await;
    assert_eq!(
        second,
        ReportOutcome::Sent {
            dates: vec![yesterday]
        }
    );
}

#[tokio::test]
async fn catch_up_dating_reports_each_missed_date() {
    let coordinator = Arc::new(ApplicationStateCoordinator::new());
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CountingSink::new());

    // Last report went out for March 10; the process was down since
    coordinator.mark_report_sent(chrono::NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());

    let workflow = ReportWorkflow::new(
        coordinator.clone(),
        store,
        Arc::new(PlainComposer),
        sink.clone(),
        fast_retry(),
        ReportDating::CatchUp,
    );

    let now = Utc.with_ymd_and_hms(2025, 3, 15, 8, 0, 0).unwrap();
    let outcome = workflow.run(now).await;

    match outcome {
        ReportOutcome::Sent { dates } => {
            let expected: Vec<_> = (11..=14)
                .map(|d| chrono::NaiveDate::from_ymd_opt(2025, 3, d).unwrap())
                .collect();
            assert_eq!(dates, expected);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(sink.delivered.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn previous_day_dating_skips_missed_dates() {
    let coordinator = Arc::new(ApplicationStateCoordinator::new());
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CountingSink::new());

    coordinator.mark_report_sent(chrono::NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());

    let workflow = ReportWorkflow::new(
        coordinator.clone(),
        store,
        Arc::new(PlainComposer),
        sink.clone(),
        fast_retry(),
        ReportDating::PreviousDay,
    );

    // Invoked days late: only yesterday is reported, the gap is skipped
    // (the original system's behavior, preserved behind configuration)
    let now = Utc.with_ymd_and_hms(2025, 3, 15, 8, 0, 0).unwrap();
    let outcome = workflow.run(now).await;
    assert_eq!(
        outcome,
        ReportOutcome::Sent {
            dates: vec![chrono::NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()]
        }
    );
    assert_eq!(sink.delivered.lock().unwrap().len(), 1);
}
