use migration_manager_pipeline::errors::OrchestratorError;
use migration_manager_repository::RepositoryError;
use migration_manager_shared::ErrorClass;
use thiserror::Error;

/// Errors that can occur during daemon initialization or execution.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required variable is missing or a value does not parse.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Config(_) => ErrorClass::Validation,
            AppError::Repository(e) => e.class(),
            AppError::Orchestrator(OrchestratorError::Repository(e)) => e.class(),
            AppError::Orchestrator(OrchestratorError::Execution(e)) => e.class(),
            AppError::Orchestrator(OrchestratorError::Task(_)) => ErrorClass::Internal,
        }
    }
}
