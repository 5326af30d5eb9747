//! # Migration Manager
//!
//! Daemon wiring for the migration manager.
//!
//! ## Modules
//!
//! - [`config`]: Environment settings and dependency initialization
//! - [`auth`]: Authorization of API callers by protocol and client certificate
//! - [`errors`]: Error types for the daemon

pub mod auth;
pub mod config;
pub mod errors;

pub use auth::{Authorizer, ClientCertificate, Entitlement, RequestDetails};
pub use config::{Connectors, Dependencies, LogFormat, Settings};
pub use errors::{AppError, AuthorizationError};
