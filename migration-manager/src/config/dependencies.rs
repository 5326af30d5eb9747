//! Dependency initialization and wiring for the migration manager.
use std::collections::HashMap;
use std::sync::Arc;

use migration_manager_pipeline::{
    InventorySource, InventorySync, MigrationWorker, Orchestrator, OrchestratorConfig, Scheduler,
    SchedulerConfig, TargetExecutor,
};
use migration_manager_repository::{
    BatchService, InstanceService, SourceService, SqliteConfig, SqliteRepository, TargetService,
};
use migration_manager_shared::{SourceType, TargetType};
use tracing::{info, warn};

use crate::auth::Authorizer;
use crate::config::Settings;
use crate::errors::AppError;

/// The source and target clients available to the pipeline, keyed by type.
///
/// Sources and targets whose type has no client here are listed but never
/// synced or migrated.
#[derive(Default)]
pub struct Connectors {
    pub inventory: HashMap<SourceType, Arc<dyn InventorySource>>,
    pub executors: HashMap<TargetType, Arc<dyn TargetExecutor>>,
}

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub repository: Arc<SqliteRepository>,
    pub sources: SourceService,
    pub targets: TargetService,
    pub instances: InstanceService,
    pub batches: BatchService,
    pub authorizer: Authorizer,
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
}

impl Dependencies {
    /// Opens the database, applies migrations and wires services and workers.
    ///
    /// # Arguments
    ///
    /// * `settings` - Settings read from the environment
    /// * `connectors` - Source and target clients to register with the workers
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(AppError::Repository)` - The database could not be opened or migrated
    pub async fn new(settings: &Settings, connectors: Connectors) -> Result<Self, AppError> {
        info!(
            database_url = %settings.database_url,
            max_connections = settings.database_max_connections,
            trusted_certificates = settings.trusted_fingerprints.len(),
            "Initializing dependencies"
        );

        let config = SqliteConfig::new(settings.database_url.clone())
            .with_max_connections(settings.database_max_connections);
        let repository = Arc::new(SqliteRepository::connect(&config).await?);
        repository.run_migrations().await?;
        info!("Database migrations applied");

        let sources = SourceService::new(repository.clone());
        let targets = TargetService::new(repository.clone());
        let instances =
            InstanceService::new(repository.clone(), repository.clone(), repository.clone());
        let batches = BatchService::new(repository.clone(), repository.clone(), repository.clone());

        if connectors.inventory.is_empty() {
            warn!("No inventory clients registered, sources will not be synced");
        }
        if connectors.executors.is_empty() {
            warn!("No target executors registered, instances will not be migrated");
        }

        let inventory = connectors.inventory.into_iter().fold(
            InventorySync::new(repository.clone(), settings.keep_alive_interval),
            |sync, (source_type, client)| sync.with_source(source_type, client),
        );
        let worker = connectors.executors.into_iter().fold(
            MigrationWorker::new(
                repository.clone(),
                repository.clone(),
                repository.clone(),
                settings.external_call_timeout,
            ),
            |worker, (target_type, executor)| worker.with_target(target_type, executor),
        );
        let scheduler = Scheduler::new(
            repository.clone(),
            repository.clone(),
            repository.clone(),
            SchedulerConfig {
                interval: settings.scheduler_interval,
            },
        );

        let orchestrator = Orchestrator::new(
            repository.clone(),
            inventory,
            scheduler,
            worker,
            OrchestratorConfig {
                inventory_sync_interval: settings.inventory_sync_interval,
                migration_interval: settings.migration_interval,
                external_call_timeout: settings.external_call_timeout,
            },
        );

        Ok(Self {
            repository,
            sources,
            targets,
            instances,
            batches,
            authorizer: Authorizer::new(&settings.trusted_fingerprints),
            orchestrator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use migration_manager_shared::{ErrorClass, Source};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> Settings {
        Settings {
            database_url: format!("sqlite://{}", dir.path().join("test.db").display()),
            database_max_connections: 1,
            inventory_sync_interval: Duration::from_secs(600),
            scheduler_interval: Duration::from_secs(10),
            migration_interval: Duration::from_secs(10),
            external_call_timeout: Duration::from_secs(300),
            keep_alive_interval: Duration::from_secs(300),
            trusted_fingerprints: vec!["AB:CD".to_string()],
            log_format: LogFormat::Pretty,
        }
    }

    #[tokio::test]
    async fn test_dependencies_wire_services_to_a_migrated_database() {
        let dir = TempDir::new().unwrap();
        let deps = Dependencies::new(&settings(&dir), Connectors::default())
            .await
            .unwrap();

        let created = deps
            .sources
            .create(Source {
                id: 0,
                name: "vcenter".to_string(),
                source_type: SourceType::Common,
                properties: json!({}),
            })
            .await
            .unwrap();
        assert_eq!(deps.sources.get_by_name("vcenter").await.unwrap(), created);
        assert_eq!(deps.authorizer.trusted_count(), 1);

        let err = deps.batches.get_by_name("missing").await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[tokio::test]
    async fn test_dependencies_reopen_an_existing_database() {
        let dir = TempDir::new().unwrap();
        {
            let deps = Dependencies::new(&settings(&dir), Connectors::default())
                .await
                .unwrap();
            deps.sources
                .create(Source {
                    id: 0,
                    name: "vcenter".to_string(),
                    source_type: SourceType::Common,
                    properties: json!({}),
                })
                .await
                .unwrap();
            deps.repository.pool().close().await;
        }

        let deps = Dependencies::new(&settings(&dir), Connectors::default())
            .await
            .unwrap();
        assert_eq!(
            deps.sources.get_all_names().await.unwrap(),
            vec!["vcenter".to_string()]
        );
    }

    #[tokio::test]
    async fn test_invalid_database_url_fails() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir);
        settings.database_url = format!(
            "sqlite://{}",
            dir.path().join("missing-dir").join("test.db").display()
        );

        let result = Dependencies::new(&settings, Connectors::default()).await;
        assert!(matches!(result, Err(AppError::Repository(_))));
    }
}
