//! Controller — the fixed-interval reconciliation loop.
//!
//! Each tick fetches both snapshot sets once, reconciles every policy
//! against that same data, applies accepted decisions, and then sleeps.
//! A failed fetch skips the whole tick. A failed target is logged and the
//! remaining targets still run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use dynoscale_core::{FleetSnapshot, QueueSnapshot, ScalingPolicy};

use crate::error::{AutoscaleError, AutoscaleResult};
use crate::reconciler::{ScaleDecision, reconcile};
use crate::source::{FleetMutator, FleetSnapshotSource, QueueSnapshotSource};

const QUEUE_SOURCE: &str = "queues";
const FLEET_SOURCE: &str = "fleet";

/// Static inputs for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Pause between the end of one tick and the start of the next.
    pub interval: Duration,
    /// Targets, reconciled in this order every tick.
    pub policies: Vec<ScalingPolicy>,
}

/// What happened to one target during a tick.
#[derive(Debug)]
pub enum TargetOutcome {
    /// The mutator accepted a new quantity.
    Scaled { from: u32, to: u32 },
    /// The target already matched policy.
    Unchanged,
    /// Reconciliation or mutation failed; retried next tick.
    Failed(AutoscaleError),
}

/// Per-target results of a single tick, in policy order.
#[derive(Debug, Default)]
pub struct TickReport {
    pub targets: Vec<(String, TargetOutcome)>,
}

impl TickReport {
    pub fn scaled(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Scaled { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Unchanged))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Failed(_)))
    }

    /// Outcome for a process type, if it was part of this tick.
    pub fn outcome(&self, process_type: &str) -> Option<&TargetOutcome> {
        self.targets
            .iter()
            .find(|(p, _)| p == process_type)
            .map(|(_, o)| o)
    }

    fn count(&self, f: impl Fn(&TargetOutcome) -> bool) -> usize {
        self.targets.iter().filter(|(_, o)| f(o)).count()
    }
}

/// The controller keeps every configured process type sized to its
/// queue's backlog.
pub struct Controller {
    config: ControllerConfig,
    queues: Arc<dyn QueueSnapshotSource>,
    fleet: Arc<dyn FleetSnapshotSource>,
    mutator: Arc<dyn FleetMutator>,
}

impl Controller {
    /// Create a new controller.
    pub fn new(
        config: ControllerConfig,
        queues: Arc<dyn QueueSnapshotSource>,
        fleet: Arc<dyn FleetSnapshotSource>,
        mutator: Arc<dyn FleetMutator>,
    ) -> Self {
        Self {
            config,
            queues,
            fleet,
            mutator,
        }
    }

    /// Confirm credentials and targets on both sides before looping.
    pub async fn verify(&self) -> AutoscaleResult<()> {
        self.queues
            .verify_access()
            .await
            .map_err(|source| AutoscaleError::StartupVerification {
                collaborator: QUEUE_SOURCE,
                source,
            })?;

        self.fleet
            .verify_access()
            .await
            .map_err(|source| AutoscaleError::StartupVerification {
                collaborator: FLEET_SOURCE,
                source,
            })?;

        debug!("collaborator access verified");
        Ok(())
    }

    /// Fetch the queue and fleet snapshots for one tick.
    pub async fn fetch_snapshots(
        &self,
    ) -> AutoscaleResult<(Vec<QueueSnapshot>, Vec<FleetSnapshot>)> {
        let (queues, fleet) = tokio::join!(self.queues.list_queues(), self.fleet.list_fleet());

        let queues = queues.map_err(|source| AutoscaleError::SnapshotFetch {
            collaborator: QUEUE_SOURCE,
            source,
        })?;
        let fleet = fleet.map_err(|source| AutoscaleError::SnapshotFetch {
            collaborator: FLEET_SOURCE,
            source,
        })?;

        Ok((queues, fleet))
    }

    /// Run one fetch → reconcile → apply pass over all targets.
    ///
    /// Returns an error only when a snapshot fetch fails, in which case
    /// no target was touched.
    pub async fn run_tick(&self) -> AutoscaleResult<TickReport> {
        let (queues, fleet) = self.fetch_snapshots().await?;

        let mut report = TickReport::default();
        for policy in &self.config.policies {
            let outcome = self.reconcile_target(policy, &queues, &fleet).await;

            match &outcome {
                TargetOutcome::Failed(e) if e.is_configuration() => error!(
                    queue = %policy.queue_name,
                    process_type = %policy.process_type,
                    error = %e,
                    "target misconfigured, skipped this tick"
                ),
                TargetOutcome::Failed(e) => warn!(
                    queue = %policy.queue_name,
                    process_type = %policy.process_type,
                    error = %e,
                    "target skipped this tick"
                ),
                _ => {}
            }

            report.targets.push((policy.process_type.clone(), outcome));
        }

        Ok(report)
    }

    async fn reconcile_target(
        &self,
        policy: &ScalingPolicy,
        queues: &[QueueSnapshot],
        fleet: &[FleetSnapshot],
    ) -> TargetOutcome {
        let (observed, to) = match reconcile(policy, queues, fleet) {
            Ok((observed, ScaleDecision::ScaleTo(to))) => (observed, to),
            Ok((_, ScaleDecision::NoChange)) => return TargetOutcome::Unchanged,
            Err(e) => return TargetOutcome::Failed(e),
        };

        info!(
            queue = %policy.queue_name,
            process_type = %policy.process_type,
            backlog = observed.backlog,
            from = observed.current,
            to,
            "scaling process type"
        );

        match self.mutator.set_quantity(&policy.process_type, to).await {
            Ok(()) => TargetOutcome::Scaled {
                from: observed.current,
                to,
            },
            Err(source) => TargetOutcome::Failed(AutoscaleError::Mutation {
                process_type: policy.process_type.clone(),
                quantity: to,
                source,
            }),
        }
    }

    /// Verify access, then run ticks until `shutdown` turns true or its
    /// sender is dropped.
    ///
    /// A tick that has started always runs to completion; the signal is
    /// observed between ticks and during the sleep.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> AutoscaleResult<()> {
        self.verify().await?;

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            targets = self.config.policies.len(),
            "autoscaler started"
        );

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }

            match self.run_tick().await {
                Ok(report) => debug!(
                    scaled = report.scaled(),
                    unchanged = report.unchanged(),
                    failed = report.failed(),
                    "tick complete"
                ),
                Err(e) => error!(error = %e, "tick skipped"),
            }

            if self.sleep_or_shutdown(&mut shutdown).await {
                break;
            }
        }

        info!("autoscaler shutting down");
        Ok(())
    }

    /// Sleep for one interval. Returns true if the loop should stop.
    async fn sleep_or_shutdown(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let sleep = tokio::time::sleep(self.config.interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = shutdown.changed() => match changed {
                    Ok(()) => {
                        if *shutdown.borrow_and_update() {
                            return true;
                        }
                    }
                    Err(_) => {
                        warn!("shutdown sender dropped, stopping autoscaler");
                        return true;
                    }
                },
            }
        }
    }
}
