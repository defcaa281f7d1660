//! # vigil-core
//!
//! Resilience and coordination primitives for a long-lived availability
//! monitor: a process that periodically probes one external resource,
//! records what it saw, alerts on transitions, and sends a daily report.
//!
//! This crate is the layer that keeps such a process correct under
//! asynchronous, unreliable I/O without any external coordination service:
//!
//! - **No overlapping checks**: [`coordinator::ApplicationStateCoordinator`]
//!   serializes the check workflow through an atomic test-and-set gate.
//! - **No duplicate daily reports**: date-keyed idempotence on the
//!   coordinator, enforced by [`workflows::ReportWorkflow`].
//! - **Graceful degradation**: [`resilience::RetryExecutor`] and
//!   [`resilience::CircuitBreaker`] bound retries and fail fast against a
//!   downed dependency; [`delivery::DeliveryQueue`] absorbs notification
//!   failures instead of surfacing them; [`health::HealthRegistry`] reports
//!   component health without letting one hung check hide the rest.
//!
//! Everything outside that - scraping, templating, scheduling, storage
//! formats - lives behind the collaborator traits in [`workflows`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vigil_core::config::CoreConfig;
//! use vigil_core::coordinator::ApplicationStateCoordinator;
//! use vigil_core::delivery::DeliveryQueue;
//! use vigil_core::resilience::{CircuitBreaker, RetryExecutor};
//!
//! # fn collaborators() -> (
//! #     Arc<dyn vigil_core::workflows::ConditionProbe>,
//! #     Arc<dyn vigil_core::workflows::CheckRecordStore>,
//! #     Arc<dyn vigil_core::workflows::ContentComposer>,
//! #     Arc<dyn vigil_core::workflows::DeliverySink>,
//! # ) { unimplemented!() }
//! # async fn example() {
//! let config = CoreConfig::default();
//! config.validate().unwrap();
//!
//! let coordinator = Arc::new(ApplicationStateCoordinator::new());
//! let queue = Arc::new(DeliveryQueue::new(config.delivery.clone()));
//! let breaker = Arc::new(CircuitBreaker::new("condition_probe", config.circuit_breaker.clone()));
//! let retry = RetryExecutor::new(config.retry.clone());
//!
//! let (probe, store, composer, sink) = collaborators();
//! let check = vigil_core::workflows::CheckWorkflow::new(
//!     coordinator.clone(), probe, store, composer, sink, queue, breaker, retry, "status-page",
//! );
//!
//! // Invoked by the external scheduler on its cadence
//! let outcome = check.run().await;
//! # let _ = outcome;
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod delivery;
pub mod error;
pub mod health;
pub mod resilience;
pub mod workflows;

pub use config::CoreConfig;
pub use coordinator::{ApplicationState, ApplicationStateCoordinator, ConditionTransition};
pub use delivery::{DeliveryQueue, DeliveryQueueStats};
pub use error::{Result, VigilError};
pub use health::{AggregateReport, HealthRegistry, HealthStatus};
pub use resilience::{CircuitBreaker, CircuitState, RetryExecutor};
pub use workflows::{CheckOutcome, CheckWorkflow, ReportOutcome, ReportWorkflow};
