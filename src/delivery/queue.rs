//! # Delivery Queue
//!
//! Bounded, best-effort FIFO of pending outbound notifications. Failures are
//! absorbed here and never propagate to the enqueuer: an item is retried up
//! to its attempt budget (requeued at the tail so one broken item cannot
//! block the head), then permanently dropped with a recorded failure.
//!
//! Delivery is at-least-once; idempotence is the sink's responsibility.

use crate::config::DeliveryConfig;
use crate::error::VigilError;
use crate::workflows::{DeliveryPayload, DeliverySink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One pending notification
struct DeliveryItem {
    payload: DeliveryPayload,
    sink: Arc<dyn DeliverySink>,
    enqueued_at: DateTime<Utc>,
    attempts: u32,
    max_attempts: u32,
}

/// Why an item left the queue without being delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Evicted (oldest item) to make room on a full queue
    Evicted,
    /// Exhausted its delivery attempts
    AttemptsExhausted,
}

/// Side-channel record of a notification that was never delivered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub descriptor: String,
    pub reason: DropReason,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub dropped_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl DeliveryFailure {
    /// Typed form of this record, for callers that propagate errors instead
    /// of reading the side channel
    pub fn as_error(&self) -> VigilError {
        VigilError::PermanentDeliveryFailure {
            descriptor: self.descriptor.clone(),
            attempts: self.attempts,
        }
    }
}

/// Counters for host observability
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryQueueStats {
    pub queued: usize,
    pub delivered: u64,
    pub evicted: u64,
    pub permanently_failed: u64,
}

/// Outcome of one drain invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// This invocation processed the queue; count of successful deliveries
    Completed { delivered: usize },
    /// Another drain pass was already running
    AlreadyRunning,
}

/// Bounded best-effort notification queue
pub struct DeliveryQueue {
    config: DeliveryConfig,
    items: Mutex<VecDeque<DeliveryItem>>,
    /// Single-flight guard for drain passes
    processing: AtomicBool,
    delivered: AtomicU64,
    evicted: AtomicU64,
    permanently_failed: AtomicU64,
    /// Bounded ring of recent failure records, readable by the host
    recent_failures: Mutex<VecDeque<DeliveryFailure>>,
}

const FAILURE_HISTORY_LIMIT: usize = 64;

impl DeliveryQueue {
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            config,
            items: Mutex::new(VecDeque::new()),
            processing: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            permanently_failed: AtomicU64::new(0),
            recent_failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Add a notification to the tail of the queue.
    ///
    /// On a full queue the oldest pending item is evicted (drop-oldest, not
    /// reject-newest) and recorded as a failure. Enqueueing never fails.
    pub async fn enqueue(&self, payload: DeliveryPayload, sink: Arc<dyn DeliverySink>) {
        let evicted = {
            let mut items = self.items.lock().await;
            let evicted = if items.len() >= self.config.max_queue_size {
                items.pop_front()
            } else {
                None
            };
            items.push_back(DeliveryItem {
                payload,
                sink,
                enqueued_at: Utc::now(),
                attempts: 0,
                max_attempts: self.config.max_attempts,
            });
            evicted
        };

        if let Some(item) = evicted {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            warn!(
                descriptor = %item.payload.descriptor,
                queue_size = self.config.max_queue_size,
                "📤 Queue full, evicted oldest pending notification"
            );
            self.record_failure(DeliveryFailure {
                descriptor: item.payload.descriptor,
                reason: DropReason::Evicted,
                attempts: item.attempts,
                enqueued_at: item.enqueued_at,
                dropped_at: Utc::now(),
                last_error: None,
            })
            .await;
        }
    }

    /// Process pending items in FIFO order until the queue is empty.
    ///
    /// At most one pass runs at a time; concurrent calls return
    /// [`DrainOutcome::AlreadyRunning`]. A failed item is requeued at the
    /// tail while it has attempts left, so attempts are bounded and the pass
    /// terminates. Items are separated by the configured inter-item delay to
    /// throttle the outbound rate.
    pub async fn drain(&self) -> DrainOutcome {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already in progress, skipping");
            return DrainOutcome::AlreadyRunning;
        }

        let mut delivered = 0usize;
        loop {
            let Some(mut item) = self.items.lock().await.pop_front() else {
                break;
            };

            // The queue lock is not held across the delivery await
            let result = item.sink.deliver(&item.payload).await;
            item.attempts += 1;

            match result {
                Ok(()) => {
                    delivered += 1;
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        descriptor = %item.payload.descriptor,
                        attempts = item.attempts,
                        "📨 Notification delivered"
                    );
                }
                Err(err) if item.attempts < item.max_attempts => {
                    warn!(
                        descriptor = %item.payload.descriptor,
                        attempts = item.attempts,
                        max_attempts = item.max_attempts,
                        error = %err,
                        "Delivery failed, requeueing at tail"
                    );
                    self.items.lock().await.push_back(item);
                }
                Err(err) => {
                    self.permanently_failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        descriptor = %item.payload.descriptor,
                        attempts = item.attempts,
                        error = %err,
                        "❌ Notification permanently dropped"
                    );
                    self.record_failure(DeliveryFailure {
                        descriptor: item.payload.descriptor.clone(),
                        reason: DropReason::AttemptsExhausted,
                        attempts: item.attempts,
                        enqueued_at: item.enqueued_at,
                        dropped_at: Utc::now(),
                        last_error: Some(err.to_string()),
                    })
                    .await;
                }
            }

            if !self.items.lock().await.is_empty() {
                tokio::time::sleep(self.config.item_delay()).await;
            }
        }

        self.processing.store(false, Ordering::Release);
        if delivered > 0 {
            info!(delivered, "Drain pass completed");
        }
        DrainOutcome::Completed { delivered }
    }

    /// Current counters and queue depth
    pub async fn stats(&self) -> DeliveryQueueStats {
        DeliveryQueueStats {
            queued: self.items.lock().await.len(),
            delivered: self.delivered.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            permanently_failed: self.permanently_failed.load(Ordering::Relaxed),
        }
    }

    /// Recent undelivered-notification records, oldest first
    pub async fn recent_failures(&self) -> Vec<DeliveryFailure> {
        self.recent_failures.lock().await.iter().cloned().collect()
    }

    /// Descriptors of currently pending items, head first
    pub async fn pending_descriptors(&self) -> Vec<String> {
        self.items
            .lock()
            .await
            .iter()
            .map(|item| item.payload.descriptor.clone())
            .collect()
    }

    async fn record_failure(&self, failure: DeliveryFailure) {
        let mut failures = self.recent_failures.lock().await;
        failures.push_back(failure);
        while failures.len() > FAILURE_HISTORY_LIMIT {
            failures.pop_front();
        }
    }
}
