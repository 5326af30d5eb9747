//! Migration Manager Main Entry Point
//!
//! Syncs source inventories, assigns instances to batches and drives them
//! through the migration phases on their targets.

use dotenv::dotenv;
use migration_manager::{AppError, Connectors, Dependencies, LogFormat, Settings};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "migration_manager=info,migration_manager_pipeline=info,migration_manager_repository=info",
        )
    });

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true),
                )
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
                .init();
        }
    }

    info!(
        service_name = "migration-manager",
        service_version = env!("CARGO_PKG_VERSION"),
        log_format = ?format,
        "Tracing initialized"
    );
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenv().ok();

    init_tracing(LogFormat::from_env());

    info!("Starting migration manager");

    let settings = Settings::from_env().inspect_err(|e| {
        error!(error = %e, "Invalid configuration");
    })?;

    // Source and target clients live outside this crate and register here.
    let deps = match Dependencies::new(&settings, Connectors::default()).await {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    match deps.orchestrator.run().await {
        Ok(()) => {
            info!("Migration manager stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Migration manager failed");
            Err(e.into())
        }
    }
}
