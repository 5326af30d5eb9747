//! This module defines the `SourceRepository` trait, the persistence interface
//! for inventory sources.
use migration_manager_shared::Source;

use crate::errors::RepositoryError;

/// A trait that defines the interface for persisting sources.
///
/// Source names are unique. A source referenced by at least one instance can
/// not be deleted.
#[async_trait::async_trait]
pub trait SourceRepository: Send + Sync {
    /// Inserts a new source.
    ///
    /// # Arguments
    ///
    /// * `source` - The source to insert; its `id` is ignored and assigned by the store.
    ///
    /// # Returns
    ///
    /// * `Ok(Source)` - The stored source, carrying its assigned id
    /// * `Err(RepositoryError::ConstraintViolation)` - A source with the same name exists
    async fn create(&self, source: Source) -> Result<Source, RepositoryError>;

    /// Returns every source, ordered by id.
    async fn get_all(&self) -> Result<Vec<Source>, RepositoryError>;

    /// Returns the names of every source, ordered by id.
    async fn get_all_names(&self) -> Result<Vec<String>, RepositoryError>;

    /// Fetches a source by id.
    ///
    /// # Returns
    ///
    /// * `Ok(Source)` - The stored source
    /// * `Err(RepositoryError::NotFound)` - No source has this id
    async fn get_by_id(&self, id: i64) -> Result<Source, RepositoryError>;

    /// Fetches a source by name.
    ///
    /// # Returns
    ///
    /// * `Ok(Source)` - The stored source
    /// * `Err(RepositoryError::NotFound)` - No source has this name
    async fn get_by_name(&self, name: &str) -> Result<Source, RepositoryError>;

    /// Replaces the name, type and properties of the source identified by `source.id`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The source was updated
    /// * `Err(RepositoryError::NotFound)` - No source has this id
    /// * `Err(RepositoryError::ConstraintViolation)` - The new name is taken
    async fn update_by_id(&self, source: Source) -> Result<(), RepositoryError>;

    /// Deletes a source by name.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The source was deleted
    /// * `Err(RepositoryError::NotFound)` - No source has this name
    /// * `Err(RepositoryError::ConstraintViolation)` - An instance still references the source
    async fn delete_by_name(&self, name: &str) -> Result<(), RepositoryError>;
}
