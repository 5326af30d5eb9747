//! Settings read from the process environment.
use std::env;
use std::time::Duration;

use crate::errors::AppError;

const DEFAULT_MAX_CONNECTIONS: u32 = 1;
const DEFAULT_INVENTORY_SYNC_INTERVAL_SECS: u64 = 600;
const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 10;
const DEFAULT_MIGRATION_INTERVAL_SECS: u64 = 10;
const DEFAULT_EXTERNAL_CALL_TIMEOUT_SECS: u64 = 300;
const DEFAULT_KEEP_ALIVE_INTERVAL_SECS: u64 = 300;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON lines with targets and thread ids.
    Json,
    /// Human readable console output.
    Pretty,
}

impl LogFormat {
    /// Reads `LOG_FORMAT`; anything but `json` selects the console format.
    pub fn from_env() -> Self {
        match env::var("LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub database_max_connections: u32,
    pub inventory_sync_interval: Duration,
    pub scheduler_interval: Duration,
    pub migration_interval: Duration,
    pub external_call_timeout: Duration,
    pub keep_alive_interval: Duration,
    pub trusted_fingerprints: Vec<String>,
    pub log_format: LogFormat,
}

impl Settings {
    /// Reads every setting from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: SQLite URL (required), e.g. `sqlite://migration-manager.db`
    /// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 1)
    /// - `INVENTORY_SYNC_INTERVAL_SECS`: Time between inventory syncs (default: 600)
    /// - `SCHEDULER_INTERVAL_SECS`: Time between scheduler sweeps (default: 10)
    /// - `MIGRATION_INTERVAL_SECS`: Time between migration ticks (default: 10)
    /// - `EXTERNAL_CALL_TIMEOUT_SECS`: Deadline for calls into sources and targets (default: 300)
    /// - `KEEP_ALIVE_INTERVAL_SECS`: Source session heartbeat period (default: 300)
    /// - `TRUSTED_CERT_FINGERPRINTS`: Comma separated SHA-256 fingerprints of trusted client certificates
    /// - `LOG_FORMAT`: `json` for JSON logs, console output otherwise
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - Every variable was present or defaulted and parsed
    /// * `Err(AppError::Config)` - `DATABASE_URL` is missing or a number does not parse
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::config("DATABASE_URL must be set"))?;

        let database_max_connections =
            parse_var("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if database_max_connections == 0 {
            return Err(AppError::config(
                "DATABASE_MAX_CONNECTIONS must be at least 1",
            ));
        }

        let trusted_fingerprints = env::var("TRUSTED_CERT_FINGERPRINTS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            database_max_connections,
            inventory_sync_interval: seconds(
                "INVENTORY_SYNC_INTERVAL_SECS",
                DEFAULT_INVENTORY_SYNC_INTERVAL_SECS,
            )?,
            scheduler_interval: seconds("SCHEDULER_INTERVAL_SECS", DEFAULT_SCHEDULER_INTERVAL_SECS)?,
            migration_interval: seconds("MIGRATION_INTERVAL_SECS", DEFAULT_MIGRATION_INTERVAL_SECS)?,
            external_call_timeout: seconds(
                "EXTERNAL_CALL_TIMEOUT_SECS",
                DEFAULT_EXTERNAL_CALL_TIMEOUT_SECS,
            )?,
            keep_alive_interval: seconds(
                "KEEP_ALIVE_INTERVAL_SECS",
                DEFAULT_KEEP_ALIVE_INTERVAL_SECS,
            )?,
            trusted_fingerprints,
            log_format: LogFormat::from_env(),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| AppError::config(format!("{name} must be a number, got {value:?}"))),
        Err(_) => Ok(default),
    }
}

/// A non-zero number of seconds.
fn seconds(name: &str, default: u64) -> Result<Duration, AppError> {
    match parse_var(name, default)? {
        0 => Err(AppError::config(format!("{name} must be greater than zero"))),
        secs => Ok(Duration::from_secs(secs)),
    }
}
