//! Orchestrator module for the migration manager pipeline.
//!
//! Runs the inventory sync, the batch scheduler and the migration worker as
//! independent periodic loops until a shutdown signal arrives.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use migration_manager_repository::SourceRepository;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::errors::OrchestratorError;
use crate::executor::MigrationWorker;
use crate::inventory::InventorySync;
use crate::scheduler::Scheduler;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Time between two inventory syncs of every source.
    pub inventory_sync_interval: Duration,
    /// Time between two migration ticks.
    pub migration_interval: Duration,
    /// Deadline for every call into a source or a target.
    pub external_call_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            inventory_sync_interval: Duration::from_secs(600),
            migration_interval: Duration::from_secs(10),
            external_call_timeout: Duration::from_secs(300),
        }
    }
}

/// Orchestrator that runs the pipeline workers.
///
/// The workers never talk to each other directly; each loop reads and writes
/// through the repositories only.
pub struct Orchestrator {
    sources: Arc<dyn SourceRepository>,
    inventory: Arc<InventorySync>,
    scheduler: Arc<Scheduler>,
    worker: Arc<MigrationWorker>,
    config: OrchestratorConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl Orchestrator {
    /// Creates a new `Orchestrator`.
    ///
    /// # Arguments
    ///
    /// * `sources` - Repository the inventory loop lists sources from
    /// * `inventory` - The inventory sync worker
    /// * `scheduler` - The batch scheduler; its own config sets its interval
    /// * `worker` - The migration worker
    /// * `config` - Loop intervals and the external call deadline
    pub fn new(
        sources: Arc<dyn SourceRepository>,
        inventory: InventorySync,
        scheduler: Scheduler,
        worker: MigrationWorker,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            sources,
            inventory: Arc::new(inventory),
            scheduler: Arc::new(scheduler),
            worker: Arc::new(worker),
            config,
            shutdown_tx,
        }
    }

    /// Trigger a graceful shutdown.
    ///
    /// The request is kept, so calling this before [`Orchestrator::run`] makes
    /// `run` return straight away.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Runs every loop until Ctrl-C or [`Orchestrator::shutdown`].
    ///
    /// A failing iteration is logged and the loop carries on with the next
    /// tick; only a panicking loop makes `run` return an error.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every loop stopped after shutdown
    /// * `Err(OrchestratorError::Task)` - A loop panicked
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), OrchestratorError> {
        info!("Starting migration manager orchestrator");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handles = vec![
            tokio::spawn(inventory_loop(
                self.sources.clone(),
                self.inventory.clone(),
                self.config.inventory_sync_interval,
                self.config.external_call_timeout,
                self.shutdown_tx.subscribe(),
            )),
            tokio::spawn(scheduler_loop(
                self.scheduler.clone(),
                self.shutdown_tx.subscribe(),
            )),
            tokio::spawn(migration_loop(
                self.worker.clone(),
                self.config.migration_interval,
                self.shutdown_tx.subscribe(),
            )),
        ];

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                self.shutdown_tx.send_replace(true);
            }
            _ = shutdown_rx.wait_for(|stop| *stop) => {
                info!("Shutdown requested");
            }
        }

        for handle in handles {
            handle.await?;
        }
        self.inventory.close_all().await;

        info!("Orchestrator shutdown complete");
        Ok(())
    }
}

async fn inventory_loop(
    sources: Arc<dyn SourceRepository>,
    inventory: Arc<InventorySync>,
    period: Duration,
    deadline: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            _ = ticker.tick() => {
                let sources = match sources.get_all().await {
                    Ok(sources) => sources,
                    Err(e) => {
                        error!(error = %e, "Failed to list sources");
                        continue;
                    }
                };

                let syncs = sources
                    .iter()
                    .filter(|source| {
                        let supported = inventory.supports(source.source_type);
                        if !supported {
                            debug!(source = %source.name, source_type = %source.source_type, "No inventory client for source type");
                        }
                        supported
                    })
                    .map(|source| {
                        let inventory = inventory.clone();
                        async move {
                            if let Err(e) = inventory.sync_source(source, deadline).await {
                                warn!(source = %source.name, error = %e, "Inventory sync failed");
                            }
                        }
                    });
                join_all(syncs).await;
            }
        }
    }
    debug!("Inventory loop stopped");
}

async fn scheduler_loop(scheduler: Arc<Scheduler>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(scheduler.config().interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            _ = ticker.tick() => {
                if let Err(e) = scheduler.run_once(Utc::now()).await {
                    error!(error = %e, "Scheduler sweep failed");
                }
            }
        }
    }
    debug!("Scheduler loop stopped");
}

async fn migration_loop(
    worker: Arc<MigrationWorker>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            _ = ticker.tick() => {
                if let Err(e) = worker.run_once(Utc::now()).await {
                    error!(error = %e, "Migration tick failed");
                }
            }
        }
    }
    debug!("Migration loop stopped");
}
