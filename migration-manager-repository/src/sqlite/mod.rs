//! SQLite implementation of the migration manager repositories.
//!
//! A single [`SqliteRepository`] implements every repository trait over one
//! `sqlx::SqlitePool`.
//!
//! ## Key Features
//!
//! - Schema migrations embedded from `migrations/` and applied with [`SqliteRepository::run_migrations`]
//! - Foreign keys enforced on every connection
//! - Multi-statement operations wrapped in [`transaction`], bounded by [`TRANSACTION_TIMEOUT`]
//! - Status changes applied as single-row updates keyed by uuid, compare-and-set where a precondition exists
//!
//! ## Database Tables
//!
//! - `sources`, `targets`: name-unique, referenced by instances (and batches for targets)
//! - `batches`: name-unique, referencing a target
//! - `instances`: keyed by uuid, referencing a source and optionally a target and a batch
//! - `instance_overrides`: one-to-one with `instances`, no cascade
use std::str::FromStr;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::SqliteConfig;
use crate::errors::RepositoryError;

mod batches;
pub(crate) mod codec;
mod instances;
mod sources;
mod targets;
mod transaction;

pub use transaction::{transaction, TRANSACTION_TIMEOUT};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite implementation of every repository trait.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Opens (creating if needed) the database described by `config`.
    ///
    /// # Arguments
    ///
    /// * `config` - Database URL and pool size
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteRepository)` - A repository over a connected pool
    /// * `Err(RepositoryError)` - The URL is invalid or the database can not be opened
    pub async fn connect(config: &SqliteConfig) -> Result<Self, RepositoryError> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        info!(url = %config.url, max_connections = config.max_connections, "Connected to database");
        Ok(Self { pool })
    }

    /// Wraps an existing pool. Foreign keys must already be enabled on it.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies pending schema migrations.
    pub async fn run_migrations(&self) -> Result<(), RepositoryError> {
        MIGRATOR.run(&self.pool).await?;
        info!("Database schema is up to date");
        Ok(())
    }
}
