use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use migration_manager_repository::{
    BatchRepository, InstanceRepository, RepositoryError, TargetRepository,
};
use migration_manager_shared::{Batch, BatchStatus, Instance, MigrationStatus, Target, TargetType};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::errors::ExecutionError;
use crate::executor::{ImportMode, MigrationPlan, TargetExecutor};
use crate::state_machine::{StateMachine, Step, TransitionOutcome};

/// Counters describing one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub advanced: usize,
    pub failed: usize,
    pub idle: usize,
}

enum StepOutcome {
    Advanced,
    Failed,
    Idle,
}

impl From<TransitionOutcome> for StepOutcome {
    fn from(outcome: TransitionOutcome) -> Self {
        match outcome {
            TransitionOutcome::Applied => StepOutcome::Advanced,
            TransitionOutcome::Disabled | TransitionOutcome::Stale => StepOutcome::Idle,
        }
    }
}

/// Advances the members of running batches through the migration phases.
///
/// Each member gets its own task per tick, and every external call is bounded
/// by `call_timeout`, so a slow target call only holds up its own instance.
#[derive(Clone)]
pub struct MigrationWorker {
    instances: Arc<dyn InstanceRepository>,
    batches: Arc<dyn BatchRepository>,
    targets: Arc<dyn TargetRepository>,
    executors: HashMap<TargetType, Arc<dyn TargetExecutor>>,
    state_machine: StateMachine,
    call_timeout: Duration,
}

impl MigrationWorker {
    pub fn new(
        instances: Arc<dyn InstanceRepository>,
        batches: Arc<dyn BatchRepository>,
        targets: Arc<dyn TargetRepository>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            state_machine: StateMachine::new(instances.clone()),
            instances,
            batches,
            targets,
            executors: HashMap::new(),
            call_timeout,
        }
    }

    /// Registers the executor used for targets of `target_type`.
    pub fn with_target(mut self, target_type: TargetType, executor: Arc<dyn TargetExecutor>) -> Self {
        self.executors.insert(target_type, executor);
        self
    }

    pub fn supports(&self, target_type: TargetType) -> bool {
        self.executors.contains_key(&target_type)
    }

    /// Runs one step for every actionable member of every running batch
    /// whose window is open at `now`, and waits for all of them.
    ///
    /// # Returns
    ///
    /// * `Ok(WorkerReport)` - How many instances advanced, failed or stayed put
    /// * `Err(ExecutionError::Repository)` - Listing batches or members failed
    #[instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<WorkerReport, ExecutionError> {
        let mut tasks = JoinSet::new();

        for batch in self.batches.get_all().await? {
            if batch.status != BatchStatus::Running || !batch.is_within_window(now) {
                continue;
            }
            let target = match self.targets.get_by_id(batch.target_id).await {
                Ok(target) => target,
                Err(RepositoryError::NotFound(_)) => {
                    warn!(batch = %batch.name, target_id = batch.target_id, "Batch target is missing");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let Some(executor) = self.executors.get(&target.target_type).cloned() else {
                warn!(batch = %batch.name, target_type = %target.target_type, "No executor registered for target type");
                continue;
            };

            let batch = Arc::new(batch);
            let target = Arc::new(target);
            for instance in self.instances.get_all_by_batch(batch.id).await? {
                if Step::for_status(instance.migration_status).is_none()
                    || instance.is_migration_disabled()
                {
                    continue;
                }

                let worker = self.clone();
                let batch = batch.clone();
                let target = target.clone();
                let executor = executor.clone();
                tasks.spawn(async move {
                    let uuid = instance.uuid;
                    (
                        uuid,
                        worker
                            .step(instance, &batch, &target, executor.as_ref())
                            .await,
                    )
                });
            }
        }

        let mut report = WorkerReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(StepOutcome::Advanced))) => report.advanced += 1,
                Ok((_, Ok(StepOutcome::Idle))) => report.idle += 1,
                Ok((_, Ok(StepOutcome::Failed))) => report.failed += 1,
                Ok((uuid, Err(e))) => {
                    error!(%uuid, error = %e, "Migration step could not be recorded");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Migration step task panicked");
                    report.failed += 1;
                }
            }
        }

        if report.advanced > 0 || report.failed > 0 {
            info!(
                advanced = report.advanced,
                failed = report.failed,
                idle = report.idle,
                "Migration tick complete"
            );
        }
        Ok(report)
    }

    async fn step(
        &self,
        instance: Instance,
        batch: &Batch,
        target: &Target,
        executor: &dyn TargetExecutor,
    ) -> Result<StepOutcome, ExecutionError> {
        let from = instance.migration_status;
        let Some(step) = Step::for_status(from) else {
            return Ok(StepOutcome::Idle);
        };

        if let Step::Retry(phase) = step {
            let outcome = self
                .state_machine
                .transition(
                    instance.uuid,
                    from,
                    phase,
                    &phase.to_string(),
                    instance.needs_disk_import,
                )
                .await?;
            return Ok(outcome.into());
        }

        if step == Step::Provision {
            if let Err(e) = instance.validate_firmware() {
                let err = ExecutionError::fatal(e.message());
                self.state_machine.record_failure(&instance, &err).await?;
                return Ok(StepOutcome::Failed);
            }
        }

        let plan = MigrationPlan::new(&instance, batch);
        let call = async {
            match step {
                Step::Provision => executor.provision(target, &plan).await,
                Step::BackgroundImport if instance.supports_background_import() => {
                    executor
                        .import_disks(target, &plan, ImportMode::Background)
                        .await
                }
                Step::FinalImport => {
                    executor
                        .import_disks(target, &plan, ImportMode::Final)
                        .await
                }
                Step::Cutover => executor.cutover(target, &plan).await,
                Step::BackgroundImport | Step::Retry(_) => Ok(()),
            }
        };
        let result = tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or(Err(ExecutionError::Deadline(self.call_timeout)));

        if let Err(e) = result {
            self.state_machine.record_failure(&instance, &e).await?;
            return Ok(StepOutcome::Failed);
        }

        let Some(next) = from.next_phase() else {
            return Ok(StepOutcome::Idle);
        };
        let needs_disk_import = from != MigrationStatus::FinalImport && instance.needs_disk_import;
        let outcome = self
            .state_machine
            .transition(
                instance.uuid,
                from,
                next,
                &next.to_string(),
                needs_disk_import,
            )
            .await?;
        Ok(outcome.into())
    }
}
