//! Shared mock collaborators for integration tests.
#![allow(dead_code)] // not every binary uses every helper

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use vigil_core::coordinator::ConditionTransition;
use vigil_core::error::VigilError;
use vigil_core::workflows::{
    CheckRecord, CheckRecordStore, ConditionProbe, ConditionSample, ContentComposer,
    DeliveryPayload, DeliverySink,
};

/// Probe that pops scripted observations, with an optional per-call delay
pub struct ScriptedProbe {
    samples: Mutex<VecDeque<Result<bool, String>>>,
    pub delay: Duration,
    pub calls: AtomicU32,
}

impl ScriptedProbe {
    pub fn new(samples: Vec<Result<bool, String>>) -> Self {
        Self {
            samples: Mutex::new(samples.into()),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ConditionProbe for ScriptedProbe {
    async fn probe(&self) -> Result<ConditionSample, VigilError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.samples.lock().unwrap().pop_front();
        match next {
            Some(Ok(value)) => Ok(ConditionSample {
                value,
                observed_at: Utc::now(),
            }),
            Some(Err(message)) => Err(VigilError::transient("probe", message)),
            None => Ok(ConditionSample {
                value: true,
                observed_at: Utc::now(),
            }),
        }
    }
}

/// In-memory check record store
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<CheckRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CheckRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckRecordStore for MemoryStore {
    async fn append(&self, record: &CheckRecord) -> Result<(), VigilError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn records_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckRecord>, VigilError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.observed_at >= from && r.observed_at < to)
            .cloned()
            .collect())
    }
}

/// Minimal composer with predictable descriptors
pub struct PlainComposer;

impl ContentComposer for PlainComposer {
    fn compose_alert(&self, transition: &ConditionTransition) -> DeliveryPayload {
        let descriptor = if transition.current {
            "alert:became-available"
        } else {
            "alert:became-unavailable"
        };
        DeliveryPayload {
            descriptor: descriptor.to_string(),
            subject: "Availability change".to_string(),
            body: format!("{:?} -> {}", transition.previous, transition.current),
        }
    }

    fn compose_report(&self, date: NaiveDate, records: &[CheckRecord]) -> DeliveryPayload {
        DeliveryPayload {
            descriptor: format!("report:{date}"),
            subject: format!("Daily report {date}"),
            body: format!("{} checks recorded", records.len()),
        }
    }
}

/// Sink that records deliveries and can fail the first N attempts
pub struct CountingSink {
    pub delivered: Mutex<Vec<DeliveryPayload>>,
    fail_first: AtomicU32,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(n: u32) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail_first: AtomicU32::new(n),
        }
    }

    pub fn delivered_descriptors(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.descriptor.clone())
            .collect()
    }
}

impl Default for CountingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliverySink for CountingSink {
    async fn deliver(&self, payload: &DeliveryPayload) -> Result<(), VigilError> {
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(VigilError::transient("sink", "delivery endpoint down"));
        }
        self.delivered.lock().unwrap().push(payload.clone());
        Ok(())
    }
}
