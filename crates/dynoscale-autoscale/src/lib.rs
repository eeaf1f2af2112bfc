//! dynoscale-autoscale — queue-backlog driven fleet scaling.
//!
//! Observes queue depth through a [`QueueSnapshotSource`], current
//! replica counts through a [`FleetSnapshotSource`], and sizes each
//! configured process type with a [`FleetMutator`].
//!
//! # Scaling Algorithm
//!
//! ```text
//! backlog = ready + unacked
//! current = replicas of policy.process_type
//!
//! if backlog > 0:
//!     desired = thresholds[largest key <= backlog]   // 0 if none
//!     if current < desired:
//!         ScaleTo(desired)
//!     // otherwise hold, even when current > desired
//!
//! if backlog == 0 and current > 0:
//!     ScaleTo(0)
//! ```
//!
//! # Control Loop
//!
//! ```text
//! verify_access (queues, fleet)      ← fatal on failure
//! loop:
//!   list_queues + list_fleet         ← failure skips the tick
//!   for each policy:
//!     reconcile → set_quantity       ← failure skips the target
//!   sleep(interval) | shutdown
//! ```

pub mod controller;
pub mod error;
pub mod reconciler;
pub mod source;

pub use controller::{Controller, ControllerConfig, TargetOutcome, TickReport};
pub use error::{AutoscaleError, AutoscaleResult};
pub use reconciler::{Observation, ScaleDecision, decide, observe, reconcile};
pub use source::{DryRunMutator, FleetMutator, FleetSnapshotSource, QueueSnapshotSource};
