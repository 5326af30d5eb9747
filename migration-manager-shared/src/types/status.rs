use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Lifecycle state of a single instance.
///
/// The ordered phases are
/// `NotAssignedBatch → AssignedBatch → BackgroundImport → FinalImport → CutoverPending → Migrated`.
/// Each active phase has a recoverable `*Error` sub-state which returns to the
/// same phase on retry, so already transferred disk data is never re-sent.
/// `Error` is terminal until an operator intervenes; `Disabled` marks an
/// unassigned instance whose overrides disable migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    NotAssignedBatch,
    AssignedBatch,
    BackgroundImport,
    BackgroundImportError,
    FinalImport,
    FinalImportError,
    CutoverPending,
    CutoverError,
    Migrated,
    Error,
    Disabled,
}

impl MigrationStatus {
    pub const ALL: [MigrationStatus; 11] = [
        MigrationStatus::NotAssignedBatch,
        MigrationStatus::AssignedBatch,
        MigrationStatus::BackgroundImport,
        MigrationStatus::BackgroundImportError,
        MigrationStatus::FinalImport,
        MigrationStatus::FinalImportError,
        MigrationStatus::CutoverPending,
        MigrationStatus::CutoverError,
        MigrationStatus::Migrated,
        MigrationStatus::Error,
        MigrationStatus::Disabled,
    ];

    /// Stable storage code.
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::NotAssignedBatch => "not_assigned_batch",
            MigrationStatus::AssignedBatch => "assigned_batch",
            MigrationStatus::BackgroundImport => "background_import",
            MigrationStatus::BackgroundImportError => "background_import_error",
            MigrationStatus::FinalImport => "final_import",
            MigrationStatus::FinalImportError => "final_import_error",
            MigrationStatus::CutoverPending => "cutover_pending",
            MigrationStatus::CutoverError => "cutover_error",
            MigrationStatus::Migrated => "migrated",
            MigrationStatus::Error => "error",
            MigrationStatus::Disabled => "disabled",
        }
    }

    /// True while disk data is being moved or the cutover has not completed.
    pub fn is_migrating(&self) -> bool {
        matches!(
            self,
            MigrationStatus::BackgroundImport
                | MigrationStatus::BackgroundImportError
                | MigrationStatus::FinalImport
                | MigrationStatus::FinalImportError
                | MigrationStatus::CutoverPending
                | MigrationStatus::CutoverError
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationStatus::Migrated | MigrationStatus::Error)
    }

    /// True for the recoverable `*Error` sub-states.
    pub fn is_recoverable_error(&self) -> bool {
        self.recovery_phase().is_some()
    }

    /// The phase a recoverable error sub-state retries.
    pub fn recovery_phase(&self) -> Option<MigrationStatus> {
        match self {
            MigrationStatus::BackgroundImportError => Some(MigrationStatus::BackgroundImport),
            MigrationStatus::FinalImportError => Some(MigrationStatus::FinalImport),
            MigrationStatus::CutoverError => Some(MigrationStatus::CutoverPending),
            _ => None,
        }
    }

    /// The recoverable error sub-state of an active phase.
    pub fn error_substate(&self) -> Option<MigrationStatus> {
        match self {
            MigrationStatus::BackgroundImport => Some(MigrationStatus::BackgroundImportError),
            MigrationStatus::FinalImport => Some(MigrationStatus::FinalImportError),
            MigrationStatus::CutoverPending => Some(MigrationStatus::CutoverError),
            _ => None,
        }
    }

    /// The next phase in the forward lifecycle, if any.
    pub fn next_phase(&self) -> Option<MigrationStatus> {
        match self {
            MigrationStatus::NotAssignedBatch => Some(MigrationStatus::AssignedBatch),
            MigrationStatus::AssignedBatch => Some(MigrationStatus::BackgroundImport),
            MigrationStatus::BackgroundImport => Some(MigrationStatus::FinalImport),
            MigrationStatus::FinalImport => Some(MigrationStatus::CutoverPending),
            MigrationStatus::CutoverPending => Some(MigrationStatus::Migrated),
            _ => None,
        }
    }

    /// Whether `self → next` is an edge of the lifecycle graph.
    ///
    /// Covers automatic edges (phase advance, error sub-state and recovery,
    /// fatal error) and the operator edges (unassign, reset after error,
    /// enable / disable of unassigned instances).
    pub fn can_transition_to(&self, next: MigrationStatus) -> bool {
        use MigrationStatus::*;

        if *self == Migrated {
            return false;
        }
        if next == Error {
            return *self != Error && *self != Disabled;
        }
        if self.next_phase() == Some(next)
            || self.error_substate() == Some(next)
            || self.recovery_phase() == Some(next)
        {
            return true;
        }

        matches!(
            (self, next),
            (AssignedBatch, NotAssignedBatch)
                | (Error, NotAssignedBatch)
                | (NotAssignedBatch, Disabled)
                | (Disabled, NotAssignedBatch)
        )
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationStatus::NotAssignedBatch => "Not assigned to a batch",
            MigrationStatus::AssignedBatch => "Assigned to a batch",
            MigrationStatus::BackgroundImport => "Performing background import tasks",
            MigrationStatus::BackgroundImportError => "Background import error",
            MigrationStatus::FinalImport => "Performing final import tasks",
            MigrationStatus::FinalImportError => "Final import error",
            MigrationStatus::CutoverPending => "Pending cutover",
            MigrationStatus::CutoverError => "Cutover error",
            MigrationStatus::Migrated => "Migrated",
            MigrationStatus::Error => "Error",
            MigrationStatus::Disabled => "Migration disabled",
        };
        f.write_str(s)
    }
}

impl FromStr for MigrationStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MigrationStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::new(format!("{s:?} is not a valid migration status")))
    }
}

/// Lifecycle state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Created, collecting instances, not started.
    Defined,
    /// Started by an operator; waiting for the scheduler.
    Ready,
    /// Started, but outside its migration window.
    Queued,
    /// Inside its migration window; members progress.
    Running,
    /// Stopped by an operator.
    Stopped,
    /// Every member is migrated.
    Finished,
    Error,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 7] = [
        BatchStatus::Defined,
        BatchStatus::Ready,
        BatchStatus::Queued,
        BatchStatus::Running,
        BatchStatus::Stopped,
        BatchStatus::Finished,
        BatchStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Defined => "defined",
            BatchStatus::Ready => "ready",
            BatchStatus::Queued => "queued",
            BatchStatus::Running => "running",
            BatchStatus::Stopped => "stopped",
            BatchStatus::Finished => "finished",
            BatchStatus::Error => "error",
        }
    }

    /// Whether the scheduler may still assign new instances to the batch.
    pub fn accepts_assignments(&self) -> bool {
        matches!(
            self,
            BatchStatus::Defined | BatchStatus::Ready | BatchStatus::Queued | BatchStatus::Running
        )
    }

    /// Whether the batch has been started and not yet stopped or finished.
    pub fn is_started(&self) -> bool {
        matches!(self, BatchStatus::Ready | BatchStatus::Queued | BatchStatus::Running)
    }

    /// Whether an operator may start the batch from this status.
    pub fn can_start(&self) -> bool {
        matches!(self, BatchStatus::Defined | BatchStatus::Stopped | BatchStatus::Error)
    }

    /// Whether an operator may stop the batch from this status.
    pub fn can_stop(&self) -> bool {
        self.is_started()
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStatus::Defined => "Defined",
            BatchStatus::Ready => "Ready to be started",
            BatchStatus::Queued => "Queued",
            BatchStatus::Running => "Running",
            BatchStatus::Stopped => "Stopped",
            BatchStatus::Finished => "Finished",
            BatchStatus::Error => "Error",
        };
        f.write_str(s)
    }
}

impl FromStr for BatchStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BatchStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::new(format!("{s:?} is not a valid batch status")))
    }
}
