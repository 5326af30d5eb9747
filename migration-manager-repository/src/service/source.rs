use std::sync::Arc;

use migration_manager_shared::Source;
use tracing::info;

use crate::errors::RepositoryError;
use crate::interfaces::SourceRepository;

/// Operator-facing operations on sources.
pub struct SourceService {
    repo: Arc<dyn SourceRepository>,
}

impl SourceService {
    pub fn new(repo: Arc<dyn SourceRepository>) -> Self {
        Self { repo }
    }

    /// Validates and stores a new source.
    ///
    /// # Returns
    ///
    /// * `Ok(Source)` - The stored source with its id
    /// * `Err(RepositoryError::Validation)` - The name is empty or the properties do not decode for the source type
    /// * `Err(RepositoryError::ConstraintViolation)` - The name is taken
    pub async fn create(&self, source: Source) -> Result<Source, RepositoryError> {
        source.validate()?;
        let created = self.repo.create(source).await?;
        info!(source = %created.name, id = created.id, "Created source");
        Ok(created)
    }

    pub async fn get_all(&self) -> Result<Vec<Source>, RepositoryError> {
        self.repo.get_all().await
    }

    pub async fn get_all_names(&self) -> Result<Vec<String>, RepositoryError> {
        self.repo.get_all_names().await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Source, RepositoryError> {
        self.repo.get_by_id(id).await
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Source, RepositoryError> {
        self.repo.get_by_name(name).await
    }

    pub async fn update(&self, source: Source) -> Result<(), RepositoryError> {
        source.validate()?;
        self.repo.update_by_id(source).await
    }

    /// Deletes a source; fails with `ConstraintViolation` while instances reference it.
    pub async fn delete_by_name(&self, name: &str) -> Result<(), RepositoryError> {
        self.repo.delete_by_name(name).await?;
        info!(source = %name, "Deleted source");
        Ok(())
    }
}
