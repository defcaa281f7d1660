//! # Best-Effort Delivery
//!
//! Bounded queue for outbound notifications with per-item retry, drop-oldest
//! eviction, and side-channel failure records. See [`queue::DeliveryQueue`].

pub mod queue;

pub use queue::{
    DeliveryFailure, DeliveryQueue, DeliveryQueueStats, DrainOutcome, DropReason,
};
