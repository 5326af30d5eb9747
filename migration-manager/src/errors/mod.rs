//! Error types for the migration manager daemon.
mod app;
mod auth;

pub use app::AppError;
pub use auth::AuthorizationError;
