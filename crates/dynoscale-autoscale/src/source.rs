//! Boundary collaborators — where snapshots come from and where
//! decisions go.
//!
//! The control loop only sees these traits. Transports (HTTP clients,
//! auth, per-call timeouts) live in the adapter crates.

use async_trait::async_trait;
use tracing::info;

use dynoscale_core::{FleetSnapshot, QueueSnapshot};

/// Reports the current backlog of every queue.
#[async_trait]
pub trait QueueSnapshotSource: Send + Sync {
    async fn list_queues(&self) -> anyhow::Result<Vec<QueueSnapshot>>;

    /// Cheap side-effect-free call used once before the loop starts.
    async fn verify_access(&self) -> anyhow::Result<()>;
}

/// Reports the current replica count of every process type.
#[async_trait]
pub trait FleetSnapshotSource: Send + Sync {
    async fn list_fleet(&self) -> anyhow::Result<Vec<FleetSnapshot>>;

    /// Cheap side-effect-free call used once before the loop starts.
    async fn verify_access(&self) -> anyhow::Result<()>;
}

/// Applies an accepted scaling decision.
#[async_trait]
pub trait FleetMutator: Send + Sync {
    async fn set_quantity(&self, process_type: &str, quantity: u32) -> anyhow::Result<()>;
}

/// A mutator that only logs what it would have done.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunMutator;

#[async_trait]
impl FleetMutator for DryRunMutator {
    async fn set_quantity(&self, process_type: &str, quantity: u32) -> anyhow::Result<()> {
        info!(%process_type, quantity, "dry run: fleet update skipped");
        Ok(())
    }
}
