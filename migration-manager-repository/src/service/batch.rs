use std::sync::Arc;

use migration_manager_shared::{Batch, BatchStatus, Instance, ValidationError};
use tracing::info;

use crate::errors::RepositoryError;
use crate::interfaces::{BatchRepository, InstanceRepository, TargetRepository};

/// Operator-facing operations on batches.
pub struct BatchService {
    batches: Arc<dyn BatchRepository>,
    instances: Arc<dyn InstanceRepository>,
    targets: Arc<dyn TargetRepository>,
}

impl BatchService {
    pub fn new(
        batches: Arc<dyn BatchRepository>,
        instances: Arc<dyn InstanceRepository>,
        targets: Arc<dyn TargetRepository>,
    ) -> Self {
        Self {
            batches,
            instances,
            targets,
        }
    }

    async fn check_target(&self, batch: &Batch) -> Result<(), RepositoryError> {
        match self.targets.get_by_id(batch.target_id).await {
            Ok(_) => Ok(()),
            Err(RepositoryError::NotFound(_)) => Err(ValidationError::new(format!(
                "Invalid batch, target {} does not exist",
                batch.target_id
            ))
            .into()),
            Err(e) => Err(e),
        }
    }

    /// Validates and stores a new batch in status `Defined`.
    ///
    /// # Returns
    ///
    /// * `Ok(Batch)` - The stored batch
    /// * `Err(RepositoryError::Validation)` - A field is invalid, the include expression does not parse, or the target does not exist
    /// * `Err(RepositoryError::ConstraintViolation)` - The name is taken
    pub async fn create(&self, batch: Batch) -> Result<Batch, RepositoryError> {
        let batch = Batch {
            status: BatchStatus::Defined,
            status_string: BatchStatus::Defined.to_string(),
            ..batch
        };
        batch.validate()?;
        self.check_target(&batch).await?;

        let created = self.batches.create(batch).await?;
        info!(batch = %created.name, id = created.id, "Created batch");
        Ok(created)
    }

    pub async fn get_all(&self) -> Result<Vec<Batch>, RepositoryError> {
        self.batches.get_all().await
    }

    pub async fn get_all_names(&self) -> Result<Vec<String>, RepositoryError> {
        self.batches.get_all_names().await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Batch, RepositoryError> {
        self.batches.get_by_id(id).await
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Batch, RepositoryError> {
        self.batches.get_by_name(name).await
    }

    /// The instances currently assigned to the batch.
    pub async fn get_instances(&self, name: &str) -> Result<Vec<Instance>, RepositoryError> {
        let batch = self.batches.get_by_name(name).await?;
        self.instances.get_all_by_batch(batch.id).await
    }

    pub async fn update(&self, batch: Batch) -> Result<(), RepositoryError> {
        batch.validate()?;
        self.check_target(&batch).await?;
        self.batches.update_by_id(batch).await
    }

    /// Deletes a batch; refused while a member is migrating.
    pub async fn delete_by_name(&self, name: &str) -> Result<(), RepositoryError> {
        self.batches.delete_by_name(name).await?;
        info!(batch = %name, "Deleted batch");
        Ok(())
    }

    /// Marks a batch ready; the scheduler moves it on from there.
    pub async fn start(&self, name: &str) -> Result<(), RepositoryError> {
        let batch = self.batches.get_by_name(name).await?;
        if !batch.status.can_start() {
            return Err(RepositoryError::not_permitted(format!(
                "batch {name:?} can not be started while {}",
                batch.status
            )));
        }
        self.batches
            .update_status_by_name(name, BatchStatus::Ready, &BatchStatus::Ready.to_string())
            .await?;
        info!(batch = %name, "Started batch");
        Ok(())
    }

    /// Stops a started batch; its members stop progressing.
    pub async fn stop(&self, name: &str) -> Result<(), RepositoryError> {
        let batch = self.batches.get_by_name(name).await?;
        if !batch.status.can_stop() {
            return Err(RepositoryError::not_permitted(format!(
                "batch {name:?} can not be stopped while {}",
                batch.status
            )));
        }
        self.batches
            .update_status_by_name(name, BatchStatus::Stopped, &BatchStatus::Stopped.to_string())
            .await?;
        info!(batch = %name, "Stopped batch");
        Ok(())
    }
}
