//! # Migration Manager Repository
//! This crate provides the persistence interfaces for the migration manager,
//! their SQLite and in-memory implementations, and the domain services built
//! on top of them.
pub mod config;
pub mod errors;
pub mod interfaces;
pub mod memory;
mod rules;
pub mod service;
pub mod sqlite;

pub use config::SqliteConfig;
pub use errors::RepositoryError;
pub use interfaces::{BatchRepository, InstanceRepository, SourceRepository, TargetRepository};
pub use memory::MemoryRepository;
pub use service::{BatchService, InstanceService, SourceService, TargetService};
pub use sqlite::SqliteRepository;
