//! Guarded status transitions for a single instance.
//!
//! Every automatic transition goes through [`StateMachine::transition`]: it
//! re-reads the stored row, refuses to move an instance whose overrides
//! disable migration, checks the edge against the lifecycle graph and then
//! applies the write as a compare-and-set on the stored status. A worker that
//! loses a race sees [`TransitionOutcome::Stale`] and re-reads on its next tick.
use std::sync::Arc;

use migration_manager_repository::{InstanceRepository, RepositoryError};
use migration_manager_shared::{Instance, MigrationStatus};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::ExecutionError;

/// The unit of work the migration worker performs for an instance in one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Leave a recoverable `*Error` sub-state for the phase it belongs to.
    Retry(MigrationStatus),
    /// Create the instance on the target.
    Provision,
    /// Differential disk sync while the source keeps running.
    BackgroundImport,
    /// Last disk sync with the source powered off.
    FinalImport,
    /// Switch execution over to the target.
    Cutover,
}

impl Step {
    /// The step an instance in `status` takes next, if any.
    pub fn for_status(status: MigrationStatus) -> Option<Step> {
        if let Some(phase) = status.recovery_phase() {
            return Some(Step::Retry(phase));
        }
        match status {
            MigrationStatus::AssignedBatch => Some(Step::Provision),
            MigrationStatus::BackgroundImport => Some(Step::BackgroundImport),
            MigrationStatus::FinalImport => Some(Step::FinalImport),
            MigrationStatus::CutoverPending => Some(Step::Cutover),
            _ => None,
        }
    }
}

/// Result of a guarded transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// Overrides disable migration; nothing was written.
    Disabled,
    /// The stored status moved on before the write.
    Stale,
}

/// Applies instance status transitions through the repository.
#[derive(Clone)]
pub struct StateMachine {
    instances: Arc<dyn InstanceRepository>,
}

impl StateMachine {
    pub fn new(instances: Arc<dyn InstanceRepository>) -> Self {
        Self { instances }
    }

    /// Moves `uuid` from `from` to `to`.
    ///
    /// `from == to` rewrites only the status string and disk-import flag, which
    /// is how a transient failure in a phase without an error sub-state is
    /// recorded. The `Disabled` edge itself is exempt from the disabled check.
    ///
    /// # Arguments
    ///
    /// * `uuid` - The instance to move
    /// * `from` - The status the caller observed
    /// * `to` - The status to write
    /// * `status_string` - Human readable status, carrying the error text on failures
    /// * `needs_disk_import` - Whether a final disk import is still outstanding
    ///
    /// # Returns
    ///
    /// * `Ok(TransitionOutcome)` - Whether the write was applied or skipped
    /// * `Err(ExecutionError::InvalidTransition)` - `from → to` is not a lifecycle edge
    /// * `Err(ExecutionError::Repository)` - The instance is missing or storage failed
    pub async fn transition(
        &self,
        uuid: Uuid,
        from: MigrationStatus,
        to: MigrationStatus,
        status_string: &str,
        needs_disk_import: bool,
    ) -> Result<TransitionOutcome, ExecutionError> {
        if from != to && !from.can_transition_to(to) {
            return Err(ExecutionError::InvalidTransition { from, to });
        }

        let stored = self.instances.get_by_uuid(uuid).await?;
        if stored.is_migration_disabled() && to != MigrationStatus::Disabled {
            debug!(%uuid, status = %stored.migration_status, "Migration disabled, skipping transition");
            return Ok(TransitionOutcome::Disabled);
        }
        if stored.migration_status != from {
            debug!(%uuid, expected = %from, found = %stored.migration_status, "Instance status moved on");
            return Ok(TransitionOutcome::Stale);
        }

        match self
            .instances
            .transition_status(uuid, from, to, status_string, needs_disk_import)
            .await
        {
            Ok(()) => {
                if from != to {
                    info!(%uuid, from = %from, to = %to, "Instance transitioned");
                }
                Ok(TransitionOutcome::Applied)
            }
            Err(RepositoryError::StaleState { found, .. }) => {
                debug!(%uuid, expected = %from, %found, "Lost transition race");
                Ok(TransitionOutcome::Stale)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Records a failed step of `instance`.
    ///
    /// Fatal errors move the instance to `Error`. Anything else moves an
    /// active phase to its `*Error` sub-state, or keeps the phase and records
    /// the error text when the phase has none.
    pub async fn record_failure(
        &self,
        instance: &Instance,
        error: &ExecutionError,
    ) -> Result<TransitionOutcome, ExecutionError> {
        let from = instance.migration_status;
        let to = if error.is_fatal() {
            MigrationStatus::Error
        } else {
            from.error_substate().unwrap_or(from)
        };

        warn!(
            uuid = %instance.uuid,
            name = instance.name(),
            status = %from,
            class = %error.class(),
            error = %error,
            "Migration step failed"
        );

        self.transition(
            instance.uuid,
            from,
            to,
            &format!("{to}: {error}"),
            instance.needs_disk_import,
        )
        .await
    }
}
