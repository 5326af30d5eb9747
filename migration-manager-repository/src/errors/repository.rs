//! Error type shared by the repository backends and the domain services.
use std::time::Duration;

use migration_manager_shared::{ErrorClass, MigrationStatus, ValidationError};
use thiserror::Error;
use uuid::Uuid;

/// Represents errors that can occur within the repositories and services.
///
/// Callers branch on the variant (or on [`RepositoryError::class`]) rather than
/// on message text. Storage-driver failures are normalised on the way in:
/// uniqueness and foreign-key violations become `ConstraintViolation`, a
/// missing row becomes `NotFound`.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Operation not permitted: {0}")]
    OperationNotPermitted(String),

    /// A compare-and-set lost the race: the stored status moved on.
    #[error("Stale state for instance {uuid}: expected {expected:?}, found {found:?}")]
    StaleState {
        uuid: Uuid,
        expected: MigrationStatus,
        found: MigrationStatus,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Transaction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl RepositoryError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }

    pub fn not_permitted(msg: impl Into<String>) -> Self {
        Self::OperationNotPermitted(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// The error class presentation layers branch on.
    pub fn class(&self) -> ErrorClass {
        match self {
            RepositoryError::NotFound(_) => ErrorClass::NotFound,
            RepositoryError::ConstraintViolation(_) => ErrorClass::ConstraintViolation,
            RepositoryError::OperationNotPermitted(_) | RepositoryError::StaleState { .. } => {
                ErrorClass::OperationNotPermitted
            }
            RepositoryError::Validation(_) => ErrorClass::Validation,
            RepositoryError::Timeout(_)
            | RepositoryError::Serialization(_)
            | RepositoryError::Database(_)
            | RepositoryError::Migration(_)
            | RepositoryError::Corrupt(_) => ErrorClass::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db)
                if db.is_unique_violation() || db.is_foreign_key_violation() =>
            {
                RepositoryError::ConstraintViolation(db.message().to_string())
            }
            other => RepositoryError::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: RepositoryError = sqlx::Error::RowNotFound.into();
        assert!(err.is_not_found());
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[test]
    fn test_classes() {
        assert_eq!(
            RepositoryError::constraint("x").class(),
            ErrorClass::ConstraintViolation
        );
        assert_eq!(
            RepositoryError::not_permitted("x").class(),
            ErrorClass::OperationNotPermitted
        );
        assert_eq!(
            RepositoryError::from(ValidationError::new("bad")).class(),
            ErrorClass::Validation
        );
        assert_eq!(
            RepositoryError::Timeout(Duration::from_secs(30)).class(),
            ErrorClass::Internal
        );
    }
}
