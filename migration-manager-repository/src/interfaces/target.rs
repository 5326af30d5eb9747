//! This module defines the `TargetRepository` trait, the persistence interface
//! for migration targets.
use migration_manager_shared::Target;

use crate::errors::RepositoryError;

/// A trait that defines the interface for persisting targets.
///
/// Target names are unique. A target referenced by an instance or a batch can
/// not be deleted.
#[async_trait::async_trait]
pub trait TargetRepository: Send + Sync {
    /// Inserts a new target; the store assigns its id.
    ///
    /// # Returns
    ///
    /// * `Ok(Target)` - The stored target, carrying its assigned id
    /// * `Err(RepositoryError::ConstraintViolation)` - A target with the same name exists
    async fn create(&self, target: Target) -> Result<Target, RepositoryError>;

    async fn get_all(&self) -> Result<Vec<Target>, RepositoryError>;

    async fn get_all_names(&self) -> Result<Vec<String>, RepositoryError>;

    /// Fetches a target by id, `NotFound` if absent.
    async fn get_by_id(&self, id: i64) -> Result<Target, RepositoryError>;

    /// Fetches a target by name, `NotFound` if absent.
    async fn get_by_name(&self, name: &str) -> Result<Target, RepositoryError>;

    /// Replaces the name, type and properties of the target identified by `target.id`.
    async fn update_by_id(&self, target: Target) -> Result<(), RepositoryError>;

    /// Deletes a target by name.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The target was deleted
    /// * `Err(RepositoryError::NotFound)` - No target has this name
    /// * `Err(RepositoryError::ConstraintViolation)` - An instance or batch still references the target
    async fn delete_by_name(&self, name: &str) -> Result<(), RepositoryError>;
}
