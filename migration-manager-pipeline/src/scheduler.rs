//! Batch scheduler.
//!
//! One sweep of [`Scheduler::run_once`] does three things, in order:
//!
//! 1. Keeps `NotAssignedBatch` and `Disabled` in step with each instance's
//!    `disable_migration` override.
//! 2. Assigns every unassigned, enabled instance to the first batch (ascending
//!    id) whose include expression matches it, binding the batch's target.
//! 3. Moves batches between `Ready`, `Queued`, `Running` and `Finished`
//!    according to their migration window and their members' progress.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use migration_manager_repository::{
    BatchRepository, InstanceRepository, RepositoryError, SourceRepository,
};
use migration_manager_shared::{Batch, BatchStatus, Expression, Instance, MigrationStatus};
use tracing::{debug, info, instrument, warn};

use crate::errors::ExecutionError;
use crate::state_machine::{StateMachine, TransitionOutcome};

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between two sweeps.
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Counters describing one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub assigned: usize,
    pub disabled: usize,
    pub enabled: usize,
    pub batches_updated: usize,
}

/// A batch whose include expression parsed, ready for matching.
struct Candidate {
    batch: Batch,
    expression: Expression,
}

pub struct Scheduler {
    sources: Arc<dyn SourceRepository>,
    instances: Arc<dyn InstanceRepository>,
    batches: Arc<dyn BatchRepository>,
    state_machine: StateMachine,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        sources: Arc<dyn SourceRepository>,
        instances: Arc<dyn InstanceRepository>,
        batches: Arc<dyn BatchRepository>,
        config: SchedulerConfig,
    ) -> Self {
        let state_machine = StateMachine::new(instances.clone());
        Self {
            sources,
            instances,
            batches,
            state_machine,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Runs one full sweep at wall-clock time `now`.
    ///
    /// # Returns
    ///
    /// * `Ok(SchedulerReport)` - What the sweep changed
    /// * `Err(ExecutionError::Repository)` - A read failed; the sweep stops and the next one starts over
    #[instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SchedulerReport, ExecutionError> {
        let mut report = SchedulerReport::default();

        self.sweep_disabled(&mut report).await?;
        self.assign_instances(&mut report).await?;
        self.update_batches(now, &mut report).await?;

        if report != SchedulerReport::default() {
            info!(
                assigned = report.assigned,
                disabled = report.disabled,
                enabled = report.enabled,
                batches_updated = report.batches_updated,
                "Scheduler sweep complete"
            );
        }
        Ok(report)
    }

    async fn sweep_disabled(&self, report: &mut SchedulerReport) -> Result<(), ExecutionError> {
        let unassigned = self
            .instances
            .get_all_by_state(MigrationStatus::NotAssignedBatch)
            .await?;
        for instance in unassigned.iter().filter(|i| i.is_migration_disabled()) {
            if self.move_status(instance, MigrationStatus::Disabled).await? {
                report.disabled += 1;
            }
        }

        let disabled = self
            .instances
            .get_all_by_state(MigrationStatus::Disabled)
            .await?;
        for instance in disabled.iter().filter(|i| !i.is_migration_disabled()) {
            if self.move_status(instance, MigrationStatus::NotAssignedBatch).await? {
                report.enabled += 1;
            }
        }
        Ok(())
    }

    async fn move_status(
        &self,
        instance: &Instance,
        to: MigrationStatus,
    ) -> Result<bool, ExecutionError> {
        let outcome = self
            .state_machine
            .transition(
                instance.uuid,
                instance.migration_status,
                to,
                &to.to_string(),
                instance.needs_disk_import,
            )
            .await;

        match outcome {
            Ok(TransitionOutcome::Applied) => Ok(true),
            Ok(_) => Ok(false),
            Err(ExecutionError::Repository(RepositoryError::NotFound(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Batches that accept assignments, in ascending id order, with parsed expressions.
    async fn candidates(&self) -> Result<Vec<Candidate>, ExecutionError> {
        let mut batches = self.batches.get_all().await?;
        batches.sort_by_key(|b| b.id);

        let mut candidates = Vec::new();
        for batch in batches {
            if !batch.status.accepts_assignments() {
                continue;
            }
            match Expression::parse(&batch.include_expression) {
                Ok(expression) => candidates.push(Candidate { batch, expression }),
                Err(e) => {
                    warn!(batch = %batch.name, error = %e, "Skipping batch with invalid include expression");
                }
            }
        }
        Ok(candidates)
    }

    /// The first candidate whose expression matches, if any.
    ///
    /// An evaluation error is a non-match for that batch only.
    fn first_match<'a>(
        candidates: &'a [Candidate],
        instance: &Instance,
        source_name: &str,
    ) -> Option<&'a Batch> {
        candidates.iter().find_map(|candidate| {
            match candidate.expression.matches(instance, source_name) {
                Ok(true) => Some(&candidate.batch),
                Ok(false) => None,
                Err(e) => {
                    warn!(
                        batch = %candidate.batch.name,
                        uuid = %instance.uuid,
                        error = %e,
                        "Include expression failed to evaluate"
                    );
                    None
                }
            }
        })
    }

    async fn assign_instances(&self, report: &mut SchedulerReport) -> Result<(), ExecutionError> {
        let candidates = self.candidates().await?;
        if candidates.is_empty() {
            return Ok(());
        }

        let source_names: HashMap<i64, String> = self
            .sources
            .get_all()
            .await?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect();

        for instance in self.instances.get_all_unassigned().await? {
            if instance.migration_status != MigrationStatus::NotAssignedBatch
                || instance.is_migration_disabled()
            {
                continue;
            }
            let source_name = source_names
                .get(&instance.source_id)
                .map(String::as_str)
                .unwrap_or_default();
            let Some(batch) = Self::first_match(&candidates, &instance, source_name) else {
                continue;
            };

            match self
                .instances
                .assign_batch(instance.uuid, batch.id, batch.target_id)
                .await
            {
                Ok(()) => {
                    info!(uuid = %instance.uuid, name = instance.name(), batch = %batch.name, "Assigned instance to batch");
                    report.assigned += 1;
                }
                Err(
                    e @ (RepositoryError::StaleState { .. }
                    | RepositoryError::OperationNotPermitted(_)
                    | RepositoryError::NotFound(_)),
                ) => {
                    debug!(uuid = %instance.uuid, error = %e, "Instance changed before assignment");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// The status `batch` should be in at `now`, given its members.
    fn next_batch_status(batch: &Batch, members: &[Instance], now: DateTime<Utc>) -> BatchStatus {
        match batch.status {
            BatchStatus::Running | BatchStatus::Queued
                if !members.is_empty()
                    && members
                        .iter()
                        .all(|i| i.migration_status == MigrationStatus::Migrated) =>
            {
                BatchStatus::Finished
            }
            BatchStatus::Ready | BatchStatus::Queued if batch.is_within_window(now) => {
                BatchStatus::Running
            }
            BatchStatus::Ready => BatchStatus::Queued,
            BatchStatus::Running if !batch.is_within_window(now) => BatchStatus::Queued,
            status => status,
        }
    }

    async fn update_batches(
        &self,
        now: DateTime<Utc>,
        report: &mut SchedulerReport,
    ) -> Result<(), ExecutionError> {
        for batch in self.batches.get_all().await? {
            if !batch.status.is_started() {
                continue;
            }
            let members = self.instances.get_all_by_batch(batch.id).await?;
            let next = Self::next_batch_status(&batch, &members, now);
            if next == batch.status {
                continue;
            }

            match self
                .batches
                .update_status_by_name(&batch.name, next, &next.to_string())
                .await
            {
                Ok(()) => {
                    info!(batch = %batch.name, from = %batch.status, to = %next, "Batch status changed");
                    report.batches_updated += 1;
                }
                Err(RepositoryError::NotFound(_)) => {
                    debug!(batch = %batch.name, "Batch deleted during sweep");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn batch(status: BatchStatus) -> Batch {
        Batch {
            id: 1,
            name: "wave-1".to_string(),
            target_id: 1,
            status,
            status_string: status.to_string(),
            storage_pool: "default".to_string(),
            include_expression: "true".to_string(),
            migration_window_start: None,
            migration_window_end: None,
            default_network: "lan".to_string(),
        }
    }

    #[test]
    fn test_ready_batch_runs_inside_window_and_queues_outside() {
        let now = Utc::now();
        assert_eq!(
            Scheduler::next_batch_status(&batch(BatchStatus::Ready), &[], now),
            BatchStatus::Running
        );

        let mut later = batch(BatchStatus::Ready);
        later.migration_window_start = Some(now + ChronoDuration::hours(1));
        assert_eq!(
            Scheduler::next_batch_status(&later, &[], now),
            BatchStatus::Queued
        );

        later.status = BatchStatus::Queued;
        assert_eq!(
            Scheduler::next_batch_status(&later, &[], now + ChronoDuration::hours(2)),
            BatchStatus::Running
        );
    }

    #[test]
    fn test_running_batch_queues_when_window_lapses() {
        let now = Utc::now();
        let mut b = batch(BatchStatus::Running);
        b.migration_window_end = Some(now - ChronoDuration::minutes(1));
        assert_eq!(Scheduler::next_batch_status(&b, &[], now), BatchStatus::Queued);
    }

    #[test]
    fn test_defined_and_stopped_batches_do_not_move() {
        let now = Utc::now();
        assert_eq!(
            Scheduler::next_batch_status(&batch(BatchStatus::Defined), &[], now),
            BatchStatus::Defined
        );
        assert_eq!(
            Scheduler::next_batch_status(&batch(BatchStatus::Stopped), &[], now),
            BatchStatus::Stopped
        );
    }
}
