//! This module defines the `InstanceRepository` trait, the persistence
//! interface for instances and their overrides.
//!
//! Field ownership between the mutating operations:
//!
//! | operation | fields written |
//! |---|---|
//! | `update_by_uuid` | inventory fields, `source_id`, `target_id` |
//! | `update_status_by_uuid`, `transition_status` | status, status string, `needs_disk_import` |
//! | `assign_batch`, `unassign_batch` | `batch_id`, `target_id`, status, status string |
//!
//! `uuid` and `secret_token` are immutable once created.
use migration_manager_shared::{Instance, MigrationStatus, Overrides};
use uuid::Uuid;

use crate::errors::RepositoryError;

/// A trait that defines the interface for persisting instances and overrides.
///
/// Every instance read attaches the instance's overrides row, if any.
#[async_trait::async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Inserts a new instance.
    ///
    /// # Arguments
    ///
    /// * `instance` - The instance to insert; `overrides` is ignored.
    ///
    /// # Returns
    ///
    /// * `Ok(Instance)` - The stored instance
    /// * `Err(RepositoryError::ConstraintViolation)` - The uuid exists, or a referenced source, target or batch does not
    async fn create(&self, instance: Instance) -> Result<Instance, RepositoryError>;

    /// Returns every instance ordered by inventory path.
    async fn get_all(&self) -> Result<Vec<Instance>, RepositoryError>;

    /// Returns the members of a batch ordered by inventory path.
    async fn get_all_by_batch(&self, batch_id: i64) -> Result<Vec<Instance>, RepositoryError>;

    async fn get_all_by_source(&self, source_id: i64) -> Result<Vec<Instance>, RepositoryError>;

    /// Returns every instance currently in `status`.
    async fn get_all_by_state(
        &self,
        status: MigrationStatus,
    ) -> Result<Vec<Instance>, RepositoryError>;

    /// Returns every instance with no batch.
    async fn get_all_unassigned(&self) -> Result<Vec<Instance>, RepositoryError>;

    /// Fetches an instance, with its overrides attached.
    ///
    /// # Returns
    ///
    /// * `Ok(Instance)` - The stored instance
    /// * `Err(RepositoryError::NotFound)` - No instance has this uuid
    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Instance, RepositoryError>;

    /// Replaces the inventory fields, `source_id` and `target_id`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The instance was updated
    /// * `Err(RepositoryError::NotFound)` - No instance has this uuid
    /// * `Err(RepositoryError::OperationNotPermitted)` - The stored instance is assigned to a batch or migrating
    async fn update_by_uuid(&self, instance: Instance) -> Result<(), RepositoryError>;

    /// Unconditionally sets the status, status string and disk-import flag.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The status was written
    /// * `Err(RepositoryError::NotFound)` - No instance has this uuid
    async fn update_status_by_uuid(
        &self,
        uuid: Uuid,
        status: MigrationStatus,
        status_string: &str,
        needs_disk_import: bool,
    ) -> Result<(), RepositoryError>;

    /// Compare-and-set on the status.
    ///
    /// Writes only when the stored status still equals `from`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The transition was applied
    /// * `Err(RepositoryError::NotFound)` - No instance has this uuid
    /// * `Err(RepositoryError::StaleState)` - The stored status is no longer `from`
    async fn transition_status(
        &self,
        uuid: Uuid,
        from: MigrationStatus,
        to: MigrationStatus,
        status_string: &str,
        needs_disk_import: bool,
    ) -> Result<(), RepositoryError>;

    /// Assigns an unassigned instance to a batch and binds it to `target_id`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The instance is now `AssignedBatch`
    /// * `Err(RepositoryError::NotFound)` - No instance has this uuid
    /// * `Err(RepositoryError::StaleState)` - The instance is no longer `NotAssignedBatch`
    /// * `Err(RepositoryError::OperationNotPermitted)` - The instance already has a batch
    async fn assign_batch(
        &self,
        uuid: Uuid,
        batch_id: i64,
        target_id: i64,
    ) -> Result<(), RepositoryError>;

    /// Detaches an instance from its batch and returns it to `NotAssignedBatch`.
    ///
    /// Allowed from `AssignedBatch` and from `Error` (operator reset).
    async fn unassign_batch(&self, uuid: Uuid) -> Result<(), RepositoryError>;

    /// Deletes an instance.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The instance was deleted
    /// * `Err(RepositoryError::NotFound)` - No instance has this uuid
    /// * `Err(RepositoryError::OperationNotPermitted)` - The instance is assigned to a batch or migrating
    /// * `Err(RepositoryError::ConstraintViolation)` - An overrides row still exists
    async fn delete_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError>;

    /// Deletes the overrides of an instance, if any, and then the instance,
    /// in one transaction.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The instance and its overrides are gone
    /// * `Err(RepositoryError::NotFound)` - No instance has this uuid
    /// * `Err(RepositoryError::OperationNotPermitted)` - The instance is assigned to a batch or migrating; nothing was removed
    async fn delete_with_overrides_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError>;

    /// Inserts overrides for an existing instance.
    ///
    /// # Returns
    ///
    /// * `Ok(Overrides)` - The stored overrides
    /// * `Err(RepositoryError::NotFound)` - No instance has this uuid
    /// * `Err(RepositoryError::ConstraintViolation)` - Overrides already exist
    async fn create_overrides(&self, overrides: Overrides) -> Result<Overrides, RepositoryError>;

    async fn get_overrides_by_uuid(&self, uuid: Uuid) -> Result<Overrides, RepositoryError>;

    async fn update_overrides_by_uuid(&self, overrides: Overrides) -> Result<(), RepositoryError>;

    async fn delete_overrides_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError>;
}
