//! Error types for the migration manager repository.
//! Consolidates and re-exports the error returned by every repository and service.
mod repository;

pub use repository::RepositoryError;
