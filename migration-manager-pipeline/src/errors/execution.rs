//! Error type for calls into sources and targets and for the workers driving them.
use std::time::Duration;

use migration_manager_repository::RepositoryError;
use migration_manager_shared::{ErrorClass, MigrationStatus};
use thiserror::Error;

/// Represents errors raised while syncing inventory or executing a migration step.
///
/// `Transient` and `Deadline` leave the instance in its current phase (or its
/// `*Error` sub-state) for the next tick to retry. `Fatal` moves the instance
/// to `Error` until an operator intervenes.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Transient execution error: {0}")]
    Transient(String),

    #[error("Fatal execution error: {0}")]
    Fatal(String),

    #[error("External call exceeded its deadline of {0:?}")]
    Deadline(Duration),

    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: MigrationStatus,
        to: MigrationStatus,
    },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl ExecutionError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ExecutionError::Transient(_) | ExecutionError::Deadline(_) => {
                ErrorClass::TransientExecution
            }
            ExecutionError::Fatal(_) => ErrorClass::FatalExecution,
            ExecutionError::InvalidTransition { .. } => ErrorClass::OperationNotPermitted,
            ExecutionError::Repository(e) => e.class(),
        }
    }

    /// Whether the instance should be moved to terminal `Error`.
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::FatalExecution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_is_transient() {
        let err = ExecutionError::Deadline(Duration::from_secs(5));
        assert_eq!(err.class(), ErrorClass::TransientExecution);
        assert!(err.class().is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_repository_errors_keep_their_class() {
        let err: ExecutionError = RepositoryError::not_found("instance").into();
        assert_eq!(err.class(), ErrorClass::NotFound);
        assert!(ExecutionError::fatal("bad firmware").is_fatal());
    }
}
