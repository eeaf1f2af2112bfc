//! Autoscaler error types.

use thiserror::Error;

/// Errors raised by the control loop.
///
/// Only [`AutoscaleError::StartupVerification`] stops the loop. Every
/// other variant is logged and scoped to a single tick or target.
#[derive(Debug, Error)]
pub enum AutoscaleError {
    #[error("failed to verify access to {collaborator}: {source}")]
    StartupVerification {
        collaborator: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to list {collaborator}: {source}")]
    SnapshotFetch {
        collaborator: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("process type not found: {0}")]
    ProcessTypeNotFound(String),

    #[error("failed to scale {process_type} to {quantity}: {source}")]
    Mutation {
        process_type: String,
        quantity: u32,
        #[source]
        source: anyhow::Error,
    },
}

impl AutoscaleError {
    /// The policy names a queue or process type the snapshots don't have.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AutoscaleError::QueueNotFound(_) | AutoscaleError::ProcessTypeNotFound(_)
        )
    }
}

pub type AutoscaleResult<T> = Result<T, AutoscaleError>;
