use std::sync::Arc;

use migration_manager_shared::Target;
use tracing::info;

use crate::errors::RepositoryError;
use crate::interfaces::TargetRepository;

/// Operator-facing operations on targets.
pub struct TargetService {
    repo: Arc<dyn TargetRepository>,
}

impl TargetService {
    pub fn new(repo: Arc<dyn TargetRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, target: Target) -> Result<Target, RepositoryError> {
        target.validate()?;
        let created = self.repo.create(target).await?;
        info!(target = %created.name, id = created.id, "Created target");
        Ok(created)
    }

    pub async fn get_all(&self) -> Result<Vec<Target>, RepositoryError> {
        self.repo.get_all().await
    }

    pub async fn get_all_names(&self) -> Result<Vec<String>, RepositoryError> {
        self.repo.get_all_names().await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Target, RepositoryError> {
        self.repo.get_by_id(id).await
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Target, RepositoryError> {
        self.repo.get_by_name(name).await
    }

    pub async fn update(&self, target: Target) -> Result<(), RepositoryError> {
        target.validate()?;
        self.repo.update_by_id(target).await
    }

    /// Deletes a target; fails with `ConstraintViolation` while an instance or
    /// batch references it.
    pub async fn delete_by_name(&self, name: &str) -> Result<(), RepositoryError> {
        self.repo.delete_by_name(name).await?;
        info!(target = %name, "Deleted target");
        Ok(())
    }
}
