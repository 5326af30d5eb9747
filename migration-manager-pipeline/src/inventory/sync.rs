use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use migration_manager_repository::{InstanceRepository, RepositoryError};
use migration_manager_shared::{Instance, Source, SourceType};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::errors::ExecutionError;
use crate::inventory::{InstanceSnapshot, InventorySource, KeepAliveSession};
use crate::state_machine::StateMachine;

/// Counters describing one sync of one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    /// Assigned or migrating instances, and snapshots that could not be stored.
    pub skipped: usize,
}

/// Pulls inventory from sources and reconciles it with the stored instances.
///
/// Clients are registered per source type; sessions are kept per source and
/// reopened whenever their heartbeat failed or a fetch went wrong.
pub struct InventorySync {
    instances: Arc<dyn InstanceRepository>,
    state_machine: StateMachine,
    clients: HashMap<SourceType, Arc<dyn InventorySource>>,
    sessions: Mutex<HashMap<i64, KeepAliveSession>>,
    keep_alive_interval: Duration,
}

impl InventorySync {
    pub fn new(instances: Arc<dyn InstanceRepository>, keep_alive_interval: Duration) -> Self {
        Self {
            state_machine: StateMachine::new(instances.clone()),
            instances,
            clients: HashMap::new(),
            sessions: Mutex::new(HashMap::new()),
            keep_alive_interval,
        }
    }

    /// Registers the client used for sources of `source_type`.
    pub fn with_source(mut self, source_type: SourceType, client: Arc<dyn InventorySource>) -> Self {
        self.clients.insert(source_type, client);
        self
    }

    pub fn supports(&self, source_type: SourceType) -> bool {
        self.clients.contains_key(&source_type)
    }

    /// Syncs one source.
    ///
    /// Unknown instances are created as `NotAssignedBatch` with a fresh secret
    /// token. Known instances that are unassigned and not migrating get their
    /// inventory fields refreshed. Everything else is left alone.
    ///
    /// When the session or the fetch fails, or the whole exchange exceeds
    /// `deadline`, every instance of the source in an active phase is moved to
    /// that phase's error sub-state and the error is returned for logging.
    ///
    /// # Returns
    ///
    /// * `Ok(SyncReport)` - What the sync changed
    /// * `Err(ExecutionError::Fatal)` - No client is registered for the source type
    /// * `Err(ExecutionError)` - The fetch failed or timed out
    #[instrument(skip(self, source), fields(source = %source.name))]
    pub async fn sync_source(
        &self,
        source: &Source,
        deadline: Duration,
    ) -> Result<SyncReport, ExecutionError> {
        let client = self.clients.get(&source.source_type).cloned().ok_or_else(|| {
            ExecutionError::fatal(format!(
                "no inventory client registered for source type {}",
                source.source_type
            ))
        })?;

        let fetched = tokio::time::timeout(deadline, self.fetch(client, source))
            .await
            .unwrap_or(Err(ExecutionError::Deadline(deadline)));

        match fetched {
            Ok(snapshots) => self.apply(source, snapshots).await,
            Err(e) => {
                warn!(error = %e, "Inventory fetch failed");
                self.drop_session(source.id).await;
                self.record_failure(source, &e).await?;
                Err(e)
            }
        }
    }

    async fn fetch(
        &self,
        client: Arc<dyn InventorySource>,
        source: &Source,
    ) -> Result<Vec<InstanceSnapshot>, ExecutionError> {
        self.ensure_session(client.clone(), source).await?;
        client.fetch_inventory(source).await
    }

    async fn ensure_session(
        &self,
        client: Arc<dyn InventorySource>,
        source: &Source,
    ) -> Result<(), ExecutionError> {
        let stale = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(&source.id).map(KeepAliveSession::is_healthy) {
                Some(true) => return Ok(()),
                Some(false) => sessions.remove(&source.id),
                None => None,
            }
        };
        if let Some(session) = stale {
            debug!("Reopening unhealthy inventory session");
            session.close().await;
        }

        let session =
            KeepAliveSession::open(client, source.clone(), self.keep_alive_interval).await?;
        self.sessions.lock().await.insert(source.id, session);
        Ok(())
    }

    async fn drop_session(&self, source_id: i64) {
        let session = self.sessions.lock().await.remove(&source_id);
        if let Some(session) = session {
            session.close().await;
        }
    }

    /// Closes every open session.
    pub async fn close_all(&self) {
        let sessions: Vec<KeepAliveSession> =
            self.sessions.lock().await.drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close().await;
        }
    }

    async fn apply(
        &self,
        source: &Source,
        snapshots: Vec<InstanceSnapshot>,
    ) -> Result<SyncReport, ExecutionError> {
        let now = Utc::now();
        let mut report = SyncReport::default();
        let mut known: HashMap<Uuid, Instance> = self
            .instances
            .get_all_by_source(source.id)
            .await?
            .into_iter()
            .map(|i| (i.uuid, i))
            .collect();

        for snapshot in snapshots {
            let uuid = snapshot.uuid;
            let result = match known.remove(&uuid) {
                None => self
                    .instances
                    .create(snapshot.into_instance(source.id, now))
                    .await
                    .map(|_| report.created += 1),
                Some(mut instance) if instance.batch_id.is_none() && !instance.is_migrating() => {
                    snapshot.apply_to(&mut instance, now);
                    self.instances
                        .update_by_uuid(instance)
                        .await
                        .map(|_| report.updated += 1)
                }
                Some(_) => {
                    report.skipped += 1;
                    Ok(())
                }
            };

            match result {
                Ok(()) => {}
                Err(
                    e @ (RepositoryError::ConstraintViolation(_)
                    | RepositoryError::Validation(_)
                    | RepositoryError::OperationNotPermitted(_)),
                ) => {
                    warn!(%uuid, error = %e, "Skipping instance from inventory");
                    report.skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            "Inventory sync complete"
        );
        Ok(report)
    }

    async fn record_failure(
        &self,
        source: &Source,
        error: &ExecutionError,
    ) -> Result<(), ExecutionError> {
        let reason = ExecutionError::transient(format!(
            "inventory sync of source {} failed: {error}",
            source.name
        ));

        for instance in self.instances.get_all_by_source(source.id).await? {
            if instance.migration_status.error_substate().is_none() {
                continue;
            }
            if let Err(e) = self.state_machine.record_failure(&instance, &reason).await {
                warn!(uuid = %instance.uuid, error = %e, "Failed to record inventory failure");
            }
        }
        Ok(())
    }
}
