//! Reconciler — turns one policy plus the tick's snapshots into a
//! scaling decision.
//!
//! The reconciler never touches the fleet. Its decisions are asymmetric:
//! while any backlog remains it only ever grows a process type toward
//! the ratio table, and it only shrinks once the queue is fully drained,
//! straight to zero.

use tracing::debug;

use dynoscale_core::{FleetSnapshot, QueueSnapshot, RatioTable, ScalingPolicy};

use crate::error::{AutoscaleError, AutoscaleResult};

/// A scaling decision for a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Set the process type to the specified quantity.
    ScaleTo(u32),
    /// No change needed.
    NoChange,
}

impl ScaleDecision {
    pub fn should_scale(&self) -> bool {
        matches!(self, ScaleDecision::ScaleTo(_))
    }

    pub fn target_quantity(&self) -> Option<u32> {
        match self {
            ScaleDecision::ScaleTo(n) => Some(*n),
            ScaleDecision::NoChange => None,
        }
    }
}

/// What a target looks like in the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Ready plus unacknowledged messages.
    pub backlog: u64,
    /// Replicas currently running for the process type.
    pub current: u32,
}

/// Locate the policy's queue and process type in the tick's snapshots.
pub fn observe(
    policy: &ScalingPolicy,
    queues: &[QueueSnapshot],
    fleet: &[FleetSnapshot],
) -> AutoscaleResult<Observation> {
    let queue = queues
        .iter()
        .find(|q| q.name == policy.queue_name)
        .ok_or_else(|| AutoscaleError::QueueNotFound(policy.queue_name.clone()))?;

    let formation = fleet
        .iter()
        .find(|f| f.process_type == policy.process_type)
        .ok_or_else(|| AutoscaleError::ProcessTypeNotFound(policy.process_type.clone()))?;

    Ok(Observation {
        backlog: queue.backlog(),
        current: formation.quantity,
    })
}

/// Decide what to do with a target given its thresholds.
pub fn decide(thresholds: &RatioTable, observed: Observation) -> ScaleDecision {
    let Observation { backlog, current } = observed;

    if backlog > 0 {
        let desired = thresholds.desired(backlog);
        if current < desired {
            return ScaleDecision::ScaleTo(desired);
        }
        // Never shrink while messages are still queued.
        return ScaleDecision::NoChange;
    }

    if current > 0 {
        return ScaleDecision::ScaleTo(0);
    }

    ScaleDecision::NoChange
}

/// Evaluate one target against the tick's snapshots.
///
/// The observation is returned alongside the decision so callers can
/// report the quantity a target was scaled from.
pub fn reconcile(
    policy: &ScalingPolicy,
    queues: &[QueueSnapshot],
    fleet: &[FleetSnapshot],
) -> AutoscaleResult<(Observation, ScaleDecision)> {
    let observed = observe(policy, queues, fleet)?;
    let decision = decide(&policy.thresholds, observed);

    debug!(
        queue = %policy.queue_name,
        process_type = %policy.process_type,
        backlog = observed.backlog,
        current = observed.current,
        ?decision,
        "target reconciled"
    );

    Ok((observed, decision))
}
