//! This module defines the `BatchRepository` trait, the persistence interface
//! for batches.
use migration_manager_shared::{Batch, BatchStatus};

use crate::errors::RepositoryError;

/// A trait that defines the interface for persisting batches.
///
/// Members are never stored on the batch; they are the instances whose
/// `batch_id` points at it.
#[async_trait::async_trait]
pub trait BatchRepository: Send + Sync {
    /// Inserts a new batch; the store assigns its id.
    ///
    /// # Returns
    ///
    /// * `Ok(Batch)` - The stored batch
    /// * `Err(RepositoryError::ConstraintViolation)` - The name is taken or the target does not exist
    async fn create(&self, batch: Batch) -> Result<Batch, RepositoryError>;

    /// Returns every batch in ascending id order.
    ///
    /// The scheduler relies on this order to break ties between batches
    /// matching the same instance.
    async fn get_all(&self) -> Result<Vec<Batch>, RepositoryError>;

    async fn get_all_names(&self) -> Result<Vec<String>, RepositoryError>;

    async fn get_by_id(&self, id: i64) -> Result<Batch, RepositoryError>;

    async fn get_by_name(&self, name: &str) -> Result<Batch, RepositoryError>;

    /// Replaces the operator-owned fields of the batch identified by `batch.id`.
    ///
    /// The status is left untouched; it is owned by `update_status_by_name`.
    /// Members still assigned (not yet migrating) follow a target change.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The batch was updated
    /// * `Err(RepositoryError::NotFound)` - No batch has this id
    /// * `Err(RepositoryError::OperationNotPermitted)` - A member is migrating
    async fn update_by_id(&self, batch: Batch) -> Result<(), RepositoryError>;

    /// Sets the status and its human-readable snapshot.
    async fn update_status_by_name(
        &self,
        name: &str,
        status: BatchStatus,
        status_string: &str,
    ) -> Result<(), RepositoryError>;

    /// Deletes a batch by name, detaching its members.
    ///
    /// Members still `AssignedBatch` return to `NotAssignedBatch` and lose
    /// their target; members in a terminal status keep it.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The batch was deleted
    /// * `Err(RepositoryError::NotFound)` - No batch has this name
    /// * `Err(RepositoryError::OperationNotPermitted)` - A member is migrating
    async fn delete_by_name(&self, name: &str) -> Result<(), RepositoryError>;
}
