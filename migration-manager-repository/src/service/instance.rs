use std::sync::Arc;

use chrono::Utc;
use migration_manager_shared::{Instance, MigrationStatus, Overrides, ValidationError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::interfaces::{InstanceRepository, SourceRepository, TargetRepository};

/// Operations on instances and their overrides.
///
/// Inventory sync and the operator both go through here; the migration
/// workers use the narrow status operations of the repository directly.
pub struct InstanceService {
    instances: Arc<dyn InstanceRepository>,
    sources: Arc<dyn SourceRepository>,
    targets: Arc<dyn TargetRepository>,
}

impl InstanceService {
    pub fn new(
        instances: Arc<dyn InstanceRepository>,
        sources: Arc<dyn SourceRepository>,
        targets: Arc<dyn TargetRepository>,
    ) -> Self {
        Self {
            instances,
            sources,
            targets,
        }
    }

    /// Maps a missing source or target to a validation error on the instance.
    async fn check_references(&self, instance: &Instance) -> Result<(), RepositoryError> {
        match self.sources.get_by_id(instance.source_id).await {
            Ok(_) => {}
            Err(RepositoryError::NotFound(_)) => {
                return Err(ValidationError::new(format!(
                    "Invalid instance, source {} does not exist",
                    instance.source_id
                ))
                .into())
            }
            Err(e) => return Err(e),
        }

        if let Some(target_id) = instance.target_id {
            match self.targets.get_by_id(target_id).await {
                Ok(_) => {}
                Err(RepositoryError::NotFound(_)) => {
                    return Err(ValidationError::new(format!(
                        "Invalid instance, target {target_id} does not exist"
                    ))
                    .into())
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Validates and stores a new instance.
    ///
    /// # Returns
    ///
    /// * `Ok(Instance)` - The stored instance
    /// * `Err(RepositoryError::Validation)` - A field invariant fails or the source / target does not exist
    /// * `Err(RepositoryError::ConstraintViolation)` - The uuid is taken
    pub async fn create(&self, instance: Instance) -> Result<Instance, RepositoryError> {
        instance.validate()?;
        self.check_references(&instance).await?;
        let created = self.instances.create(instance).await?;
        debug!(uuid = %created.uuid, path = %created.inventory_path, "Created instance");
        Ok(created)
    }

    pub async fn get_all(&self) -> Result<Vec<Instance>, RepositoryError> {
        self.instances.get_all().await
    }

    pub async fn get_all_by_batch(&self, batch_id: i64) -> Result<Vec<Instance>, RepositoryError> {
        self.instances.get_all_by_batch(batch_id).await
    }

    pub async fn get_all_by_source(&self, source_id: i64) -> Result<Vec<Instance>, RepositoryError> {
        self.instances.get_all_by_source(source_id).await
    }

    pub async fn get_all_by_state(
        &self,
        status: MigrationStatus,
    ) -> Result<Vec<Instance>, RepositoryError> {
        self.instances.get_all_by_state(status).await
    }

    pub async fn get_all_unassigned(&self) -> Result<Vec<Instance>, RepositoryError> {
        self.instances.get_all_unassigned().await
    }

    pub async fn get_by_uuid(&self, uuid: Uuid) -> Result<Instance, RepositoryError> {
        self.instances.get_by_uuid(uuid).await
    }

    /// Full-record update; rejected while the instance is assigned or migrating.
    pub async fn update(&self, instance: Instance) -> Result<(), RepositoryError> {
        instance.validate()?;
        self.check_references(&instance).await?;
        self.instances.update_by_uuid(instance).await
    }

    /// Narrow status update, independent of the full record.
    pub async fn update_status(
        &self,
        uuid: Uuid,
        status: MigrationStatus,
        status_string: &str,
        needs_disk_import: bool,
    ) -> Result<(), RepositoryError> {
        self.instances
            .update_status_by_uuid(uuid, status, status_string, needs_disk_import)
            .await
    }

    /// Returns an instance to `NotAssignedBatch`, either leaving its batch or
    /// recovering from `Error`.
    pub async fn reset(&self, uuid: Uuid) -> Result<(), RepositoryError> {
        self.instances.unassign_batch(uuid).await?;
        info!(uuid = %uuid, "Reset instance");
        Ok(())
    }

    /// Deletes an instance, removing its overrides first.
    ///
    /// Both removals happen in one transaction, so a refused delete leaves the
    /// overrides in place.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The instance and its overrides are gone
    /// * `Err(RepositoryError::NotFound)` - No instance has this uuid
    /// * `Err(RepositoryError::OperationNotPermitted)` - The instance is assigned or migrating
    pub async fn delete_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError> {
        self.instances.delete_with_overrides_by_uuid(uuid).await?;
        info!(uuid = %uuid, "Deleted instance");
        Ok(())
    }

    pub async fn create_overrides(&self, overrides: Overrides) -> Result<Overrides, RepositoryError> {
        overrides.validate()?;
        self.instances.create_overrides(overrides).await
    }

    pub async fn get_overrides_by_uuid(&self, uuid: Uuid) -> Result<Overrides, RepositoryError> {
        self.instances.get_overrides_by_uuid(uuid).await
    }

    /// Replaces the overrides, stamping `last_update` with the current time.
    pub async fn update_overrides(&self, overrides: Overrides) -> Result<(), RepositoryError> {
        overrides.validate()?;
        self.instances
            .update_overrides_by_uuid(Overrides {
                last_update: Utc::now(),
                ..overrides
            })
            .await
    }

    pub async fn delete_overrides_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError> {
        self.instances.delete_overrides_by_uuid(uuid).await
    }
}
