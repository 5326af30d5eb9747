use migration_manager_repository::RepositoryError;
use thiserror::Error;

use crate::errors::ExecutionError;

/// Represents errors that can occur while running the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
