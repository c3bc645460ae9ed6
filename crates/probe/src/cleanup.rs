//! Deletion of the target object and verification that nothing remains.

use crate::error::{Phase, ProbeError, ProbeResult};
use blockprobe_core::ObjectName;
use blockprobe_storage::{BlockStore, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Final observed state after cleanup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Residual {
    FullyDeleted,
    StillPresent,
}

/// Non-fatal: the object survived both deletion attempts.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("object {object} still exists after {attempts} deletion attempts")]
pub struct ResidualStateWarning {
    pub object: ObjectName,
    pub attempts: u8,
}

/// How a delete request treats an object that is already gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteMode {
    /// Not-found is the expected answer for an absent object.
    IfExists,
    /// The object was just reported present, so not-found is an anomaly
    /// worth recording.
    Strict,
}

/// What a single delete request observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupReport {
    pub object: ObjectName,
    pub deletion_attempts: u8,
    /// Outcome of the first, tolerant delete.
    pub first_delete: DeleteOutcome,
    /// Outcome of the strict second delete, when one was needed.
    pub strict_delete: Option<DeleteOutcome>,
    pub residual: Residual,
}

impl CleanupReport {
    pub fn warning(&self) -> Option<ResidualStateWarning> {
        match self.residual {
            Residual::FullyDeleted => None,
            Residual::StillPresent => Some(ResidualStateWarning {
                object: self.object.clone(),
                attempts: self.deletion_attempts,
            }),
        }
    }
}

/// Deletes the object and re-checks, escalating to a strict delete once.
pub struct CleanupVerifier {
    store: Arc<dyn BlockStore>,
    object: ObjectName,
}

impl CleanupVerifier {
    pub fn new(store: Arc<dyn BlockStore>, object: ObjectName) -> Self {
        Self { store, object }
    }

    /// Delete if present, check, and issue a strict delete if the object is
    /// still there.
    ///
    /// Not-found never aborts cleanup. On the strict delete it contradicts
    /// the existence check just made, so it is logged as a warning and
    /// recorded in the report. Any other store error is fatal.
    pub async fn verify(&self) -> ProbeResult<CleanupReport> {
        tracing::info!(object = %self.object, "Deleting object to clean up uncommitted blocks");
        let first_delete = self.delete(DeleteMode::IfExists).await?;
        let mut exists = self.exists().await?;
        tracing::info!(exists, "Object existence after deletion attempt");

        let mut attempts = 1;
        let mut strict_delete = None;
        if exists {
            tracing::warn!(object = %self.object, "Object still present, issuing strict delete");
            attempts = 2;
            strict_delete = Some(self.delete(DeleteMode::Strict).await?);
            exists = self.exists().await?;
            tracing::info!(exists, "Object existence after strict deletion attempt");
        }

        let report = CleanupReport {
            object: self.object.clone(),
            deletion_attempts: attempts,
            first_delete,
            strict_delete,
            residual: if exists {
                Residual::StillPresent
            } else {
                Residual::FullyDeleted
            },
        };
        match report.warning() {
            Some(warning) => tracing::warn!(%warning, "Object could not be fully deleted"),
            None => tracing::info!("Object deleted, uncommitted blocks cleaned up"),
        }
        Ok(report)
    }

    async fn delete(&self, mode: DeleteMode) -> ProbeResult<DeleteOutcome> {
        match self.store.delete(&self.object, true).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(err) if err.is_not_found() => {
                match mode {
                    DeleteMode::IfExists => {
                        tracing::debug!(object = %self.object, "Object already absent")
                    }
                    DeleteMode::Strict => tracing::warn!(
                        object = %self.object,
                        error = %err,
                        "Strict delete found no object after it was reported present"
                    ),
                }
                Ok(DeleteOutcome::NotFound)
            }
            Err(err) => Err(fatal(err)),
        }
    }

    async fn exists(&self) -> ProbeResult<bool> {
        self.store.exists(&self.object).await.map_err(fatal)
    }
}

fn fatal(source: StoreError) -> ProbeError {
    ProbeError::Unclassified {
        phase: Phase::Cleanup,
        source,
    }
}
