//! In-memory implementation of the repository traits.
//!
//! Backed by ordered maps behind one async mutex, so each operation is atomic
//! the way a single SQLite transaction is. Reference and uniqueness checks
//! mirror the SQLite schema constraints. Used by pipeline tests and anywhere a
//! throwaway store is enough.
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use migration_manager_shared::{
    Batch, BatchStatus, Instance, MigrationStatus, Overrides, Source, Target,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::interfaces::{BatchRepository, InstanceRepository, SourceRepository, TargetRepository};
use crate::rules;

#[derive(Default)]
struct State {
    sources: BTreeMap<i64, Source>,
    targets: BTreeMap<i64, Target>,
    batches: BTreeMap<i64, Batch>,
    instances: HashMap<Uuid, Instance>,
    overrides: HashMap<Uuid, Overrides>,
    next_source_id: i64,
    next_target_id: i64,
    next_batch_id: i64,
}

impl State {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    /// The stored instance with its overrides attached.
    fn instance(&self, uuid: Uuid) -> Result<Instance, RepositoryError> {
        let mut instance = self
            .instances
            .get(&uuid)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("instance {uuid}")))?;
        instance.overrides = self.overrides.get(&uuid).cloned();
        Ok(instance)
    }

    fn instances_where(&self, predicate: impl Fn(&Instance) -> bool) -> Vec<Instance> {
        let mut found: Vec<Instance> = self
            .instances
            .values()
            .filter(|i| predicate(i))
            .map(|i| Instance {
                overrides: self.overrides.get(&i.uuid).cloned(),
                ..i.clone()
            })
            .collect();
        found.sort_by(|a, b| a.inventory_path.cmp(&b.inventory_path));
        found
    }

    fn check_references(&self, instance: &Instance) -> Result<(), RepositoryError> {
        if !self.sources.contains_key(&instance.source_id) {
            return Err(RepositoryError::constraint(format!(
                "source {} does not exist",
                instance.source_id
            )));
        }
        if let Some(target_id) = instance.target_id {
            if !self.targets.contains_key(&target_id) {
                return Err(RepositoryError::constraint(format!(
                    "target {target_id} does not exist"
                )));
            }
        }
        if let Some(batch_id) = instance.batch_id {
            if !self.batches.contains_key(&batch_id) {
                return Err(RepositoryError::constraint(format!(
                    "batch {batch_id} does not exist"
                )));
            }
        }
        Ok(())
    }

    fn batch_id_by_name(&self, name: &str) -> Result<i64, RepositoryError> {
        self.batches
            .values()
            .find(|b| b.name == name)
            .map(|b| b.id)
            .ok_or_else(|| RepositoryError::not_found(format!("batch {name:?}")))
    }
}

/// In-memory implementation of every repository trait.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SourceRepository for MemoryRepository {
    async fn create(&self, source: Source) -> Result<Source, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.sources.values().any(|s| s.name == source.name) {
            return Err(RepositoryError::constraint(format!(
                "source {:?} already exists",
                source.name
            )));
        }
        let id = State::next_id(&mut state.next_source_id);
        let source = Source { id, ..source };
        state.sources.insert(id, source.clone());
        Ok(source)
    }

    async fn get_all(&self) -> Result<Vec<Source>, RepositoryError> {
        Ok(self.state.lock().await.sources.values().cloned().collect())
    }

    async fn get_all_names(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .sources
            .values()
            .map(|s| s.name.clone())
            .collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Source, RepositoryError> {
        self.state
            .lock()
            .await
            .sources
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("source with id {id}")))
    }

    async fn get_by_name(&self, name: &str) -> Result<Source, RepositoryError> {
        self.state
            .lock()
            .await
            .sources
            .values()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("source {name:?}")))
    }

    async fn update_by_id(&self, source: Source) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if !state.sources.contains_key(&source.id) {
            return Err(RepositoryError::not_found(format!("source with id {}", source.id)));
        }
        if state
            .sources
            .values()
            .any(|s| s.name == source.name && s.id != source.id)
        {
            return Err(RepositoryError::constraint(format!(
                "source {:?} already exists",
                source.name
            )));
        }
        state.sources.insert(source.id, source);
        Ok(())
    }

    async fn delete_by_name(&self, name: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let id = state
            .sources
            .values()
            .find(|s| s.name == name)
            .map(|s| s.id)
            .ok_or_else(|| RepositoryError::not_found(format!("source {name:?}")))?;
        if state.instances.values().any(|i| i.source_id == id) {
            return Err(RepositoryError::constraint(format!(
                "source {name:?} is referenced by instances"
            )));
        }
        state.sources.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl TargetRepository for MemoryRepository {
    async fn create(&self, target: Target) -> Result<Target, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.targets.values().any(|t| t.name == target.name) {
            return Err(RepositoryError::constraint(format!(
                "target {:?} already exists",
                target.name
            )));
        }
        let id = State::next_id(&mut state.next_target_id);
        let target = Target { id, ..target };
        state.targets.insert(id, target.clone());
        Ok(target)
    }

    async fn get_all(&self) -> Result<Vec<Target>, RepositoryError> {
        Ok(self.state.lock().await.targets.values().cloned().collect())
    }

    async fn get_all_names(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .targets
            .values()
            .map(|t| t.name.clone())
            .collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Target, RepositoryError> {
        self.state
            .lock()
            .await
            .targets
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("target with id {id}")))
    }

    async fn get_by_name(&self, name: &str) -> Result<Target, RepositoryError> {
        self.state
            .lock()
            .await
            .targets
            .values()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("target {name:?}")))
    }

    async fn update_by_id(&self, target: Target) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if !state.targets.contains_key(&target.id) {
            return Err(RepositoryError::not_found(format!("target with id {}", target.id)));
        }
        if state
            .targets
            .values()
            .any(|t| t.name == target.name && t.id != target.id)
        {
            return Err(RepositoryError::constraint(format!(
                "target {:?} already exists",
                target.name
            )));
        }
        state.targets.insert(target.id, target);
        Ok(())
    }

    async fn delete_by_name(&self, name: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let id = state
            .targets
            .values()
            .find(|t| t.name == name)
            .map(|t| t.id)
            .ok_or_else(|| RepositoryError::not_found(format!("target {name:?}")))?;
        let referenced = state.instances.values().any(|i| i.target_id == Some(id))
            || state.batches.values().any(|b| b.target_id == id);
        if referenced {
            return Err(RepositoryError::constraint(format!(
                "target {name:?} is referenced by instances or batches"
            )));
        }
        state.targets.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl InstanceRepository for MemoryRepository {
    async fn create(&self, instance: Instance) -> Result<Instance, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.instances.contains_key(&instance.uuid) {
            return Err(RepositoryError::constraint(format!(
                "instance {} already exists",
                instance.uuid
            )));
        }
        state.check_references(&instance)?;
        let instance = Instance {
            overrides: None,
            ..instance
        };
        state.instances.insert(instance.uuid, instance.clone());
        Ok(instance)
    }

    async fn get_all(&self) -> Result<Vec<Instance>, RepositoryError> {
        Ok(self.state.lock().await.instances_where(|_| true))
    }

    async fn get_all_by_batch(&self, batch_id: i64) -> Result<Vec<Instance>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .instances_where(|i| i.batch_id == Some(batch_id)))
    }

    async fn get_all_by_source(&self, source_id: i64) -> Result<Vec<Instance>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .instances_where(|i| i.source_id == source_id))
    }

    async fn get_all_by_state(
        &self,
        status: MigrationStatus,
    ) -> Result<Vec<Instance>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .instances_where(|i| i.migration_status == status))
    }

    async fn get_all_unassigned(&self) -> Result<Vec<Instance>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .instances_where(|i| i.batch_id.is_none()))
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Instance, RepositoryError> {
        self.state.lock().await.instance(uuid)
    }

    async fn update_by_uuid(&self, instance: Instance) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state.instance(instance.uuid)?;
        rules::ensure_updatable(&stored)?;

        let updated = Instance {
            uuid: stored.uuid,
            secret_token: stored.secret_token,
            batch_id: stored.batch_id,
            migration_status: stored.migration_status,
            migration_status_string: stored.migration_status_string,
            needs_disk_import: stored.needs_disk_import,
            overrides: None,
            ..instance
        };
        state.check_references(&updated)?;
        state.instances.insert(updated.uuid, updated);
        Ok(())
    }

    async fn update_status_by_uuid(
        &self,
        uuid: Uuid,
        status: MigrationStatus,
        status_string: &str,
        needs_disk_import: bool,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state
            .instances
            .get_mut(&uuid)
            .ok_or_else(|| RepositoryError::not_found(format!("instance {uuid}")))?;
        stored.migration_status = status;
        stored.migration_status_string = status_string.to_string();
        stored.needs_disk_import = needs_disk_import;
        Ok(())
    }

    async fn transition_status(
        &self,
        uuid: Uuid,
        from: MigrationStatus,
        to: MigrationStatus,
        status_string: &str,
        needs_disk_import: bool,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state
            .instances
            .get_mut(&uuid)
            .ok_or_else(|| RepositoryError::not_found(format!("instance {uuid}")))?;
        if stored.migration_status != from {
            return Err(rules::stale(stored, from));
        }
        stored.migration_status = to;
        stored.migration_status_string = status_string.to_string();
        stored.needs_disk_import = needs_disk_import;
        Ok(())
    }

    async fn assign_batch(
        &self,
        uuid: Uuid,
        batch_id: i64,
        target_id: i64,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state.instance(uuid)?;
        rules::ensure_assignable(&stored)?;
        if !state.batches.contains_key(&batch_id) {
            return Err(RepositoryError::constraint(format!(
                "batch {batch_id} does not exist"
            )));
        }
        if !state.targets.contains_key(&target_id) {
            return Err(RepositoryError::constraint(format!(
                "target {target_id} does not exist"
            )));
        }

        if let Some(instance) = state.instances.get_mut(&uuid) {
            instance.batch_id = Some(batch_id);
            instance.target_id = Some(target_id);
            instance.migration_status = MigrationStatus::AssignedBatch;
            instance.migration_status_string = MigrationStatus::AssignedBatch.to_string();
        }
        Ok(())
    }

    async fn unassign_batch(&self, uuid: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state.instance(uuid)?;
        rules::ensure_unassignable(&stored)?;

        if let Some(instance) = state.instances.get_mut(&uuid) {
            instance.batch_id = None;
            instance.target_id = None;
            instance.migration_status = MigrationStatus::NotAssignedBatch;
            instance.migration_status_string = MigrationStatus::NotAssignedBatch.to_string();
        }
        Ok(())
    }

    async fn delete_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state.instance(uuid)?;
        rules::ensure_deletable(&stored)?;
        state.instances.remove(&uuid);
        Ok(())
    }

    async fn delete_with_overrides_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let mut stored = state.instance(uuid)?;
        stored.overrides = None;
        rules::ensure_deletable(&stored)?;
        state.overrides.remove(&uuid);
        state.instances.remove(&uuid);
        Ok(())
    }

    async fn create_overrides(&self, overrides: Overrides) -> Result<Overrides, RepositoryError> {
        let mut state = self.state.lock().await;
        if !state.instances.contains_key(&overrides.uuid) {
            return Err(RepositoryError::not_found(format!(
                "instance {}",
                overrides.uuid
            )));
        }
        if state.overrides.contains_key(&overrides.uuid) {
            return Err(RepositoryError::constraint(format!(
                "overrides for instance {} already exist",
                overrides.uuid
            )));
        }
        state.overrides.insert(overrides.uuid, overrides.clone());
        Ok(overrides)
    }

    async fn get_overrides_by_uuid(&self, uuid: Uuid) -> Result<Overrides, RepositoryError> {
        self.state
            .lock()
            .await
            .overrides
            .get(&uuid)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("overrides for instance {uuid}")))
    }

    async fn update_overrides_by_uuid(&self, overrides: Overrides) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        match state.overrides.get_mut(&overrides.uuid) {
            Some(stored) => {
                *stored = overrides;
                Ok(())
            }
            None => Err(RepositoryError::not_found(format!(
                "overrides for instance {}",
                overrides.uuid
            ))),
        }
    }

    async fn delete_overrides_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError> {
        self.state
            .lock()
            .await
            .overrides
            .remove(&uuid)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found(format!("overrides for instance {uuid}")))
    }
}

#[async_trait]
impl BatchRepository for MemoryRepository {
    async fn create(&self, batch: Batch) -> Result<Batch, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.batches.values().any(|b| b.name == batch.name) {
            return Err(RepositoryError::constraint(format!(
                "batch {:?} already exists",
                batch.name
            )));
        }
        if !state.targets.contains_key(&batch.target_id) {
            return Err(RepositoryError::constraint(format!(
                "target {} does not exist",
                batch.target_id
            )));
        }
        let id = State::next_id(&mut state.next_batch_id);
        let batch = Batch { id, ..batch };
        state.batches.insert(id, batch.clone());
        Ok(batch)
    }

    async fn get_all(&self) -> Result<Vec<Batch>, RepositoryError> {
        Ok(self.state.lock().await.batches.values().cloned().collect())
    }

    async fn get_all_names(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .batches
            .values()
            .map(|b| b.name.clone())
            .collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Batch, RepositoryError> {
        self.state
            .lock()
            .await
            .batches
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("batch with id {id}")))
    }

    async fn get_by_name(&self, name: &str) -> Result<Batch, RepositoryError> {
        let state = self.state.lock().await;
        let id = state.batch_id_by_name(name)?;
        state
            .batches
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("batch {name:?}")))
    }

    async fn update_by_id(&self, batch: Batch) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state
            .batches
            .get(&batch.id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("batch with id {}", batch.id)))?;
        let members = state.instances_where(|i| i.batch_id == Some(batch.id));
        rules::ensure_no_member_migrating(&stored.name, &members)?;

        if state
            .batches
            .values()
            .any(|b| b.name == batch.name && b.id != batch.id)
        {
            return Err(RepositoryError::constraint(format!(
                "batch {:?} already exists",
                batch.name
            )));
        }
        if !state.targets.contains_key(&batch.target_id) {
            return Err(RepositoryError::constraint(format!(
                "target {} does not exist",
                batch.target_id
            )));
        }

        for instance in state.instances.values_mut() {
            if instance.batch_id == Some(batch.id)
                && instance.migration_status == MigrationStatus::AssignedBatch
            {
                instance.target_id = Some(batch.target_id);
            }
        }
        let updated = Batch {
            status: stored.status,
            status_string: stored.status_string,
            ..batch
        };
        state.batches.insert(updated.id, updated);
        Ok(())
    }

    async fn update_status_by_name(
        &self,
        name: &str,
        status: BatchStatus,
        status_string: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let id = state.batch_id_by_name(name)?;
        if let Some(batch) = state.batches.get_mut(&id) {
            batch.status = status;
            batch.status_string = status_string.to_string();
        }
        Ok(())
    }

    async fn delete_by_name(&self, name: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let id = state.batch_id_by_name(name)?;
        let members = state.instances_where(|i| i.batch_id == Some(id));
        rules::ensure_members_settled(name, &members)?;

        for instance in state.instances.values_mut() {
            if instance.batch_id == Some(id) {
                instance.batch_id = None;
            }
        }
        state.batches.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration_manager_shared::{
        InstanceCpuInfo, InstanceMemoryInfo, SourceType, TargetType,
    };
    use serde_json::json;

    fn instance(source_id: i64) -> Instance {
        Instance {
            uuid: Uuid::new_v4(),
            inventory_path: "/dc/vm/alpha".to_string(),
            annotation: String::new(),
            migration_status: MigrationStatus::NotAssignedBatch,
            migration_status_string: MigrationStatus::NotAssignedBatch.to_string(),
            last_update_from_source: chrono::Utc::now(),
            source_id,
            target_id: None,
            batch_id: None,
            guest_tools_version: 0,
            architecture: "x86_64".to_string(),
            hardware_version: "vmx-21".to_string(),
            os: "Ubuntu".to_string(),
            os_version: "24.04".to_string(),
            devices: vec![],
            disks: vec![],
            nics: vec![],
            snapshots: vec![],
            cpu: InstanceCpuInfo::default(),
            memory: InstanceMemoryInfo::default(),
            use_legacy_bios: false,
            secure_boot_enabled: false,
            tpm_present: false,
            needs_disk_import: false,
            secret_token: Uuid::new_v4(),
            overrides: None,
        }
    }

    async fn seeded() -> (MemoryRepository, Source, Target) {
        let repo = MemoryRepository::new();
        let source = SourceRepository::create(
            &repo,
            Source {
                id: 0,
                name: "src".to_string(),
                source_type: SourceType::Common,
                properties: json!({}),
            },
        )
        .await
        .unwrap();
        let target = TargetRepository::create(
            &repo,
            Target {
                id: 0,
                name: "tgt".to_string(),
                target_type: TargetType::Incus,
                properties: json!({"endpoint": "https://incus:8443"}),
            },
        )
        .await
        .unwrap();
        (repo, source, target)
    }

    #[tokio::test]
    async fn test_unknown_source_is_a_constraint_violation() {
        let (repo, _, _) = seeded().await;
        let err = InstanceRepository::create(&repo, instance(42)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_full_update_keeps_status_owned_fields() {
        let (repo, source, _) = seeded().await;
        let created = InstanceRepository::create(&repo, instance(source.id)).await.unwrap();
        repo.update_status_by_uuid(created.uuid, MigrationStatus::Disabled, "off", true)
            .await
            .unwrap();

        let mut edited = created.clone();
        edited.os = "Debian".to_string();
        edited.migration_status = MigrationStatus::Migrated;
        repo.update_by_uuid(edited).await.unwrap();

        let stored = repo.get_by_uuid(created.uuid).await.unwrap();
        assert_eq!(stored.os, "Debian");
        assert_eq!(stored.migration_status, MigrationStatus::Disabled);
        assert!(stored.needs_disk_import);
    }

    #[tokio::test]
    async fn test_transition_status_detects_stale_state() {
        let (repo, source, _) = seeded().await;
        let created = InstanceRepository::create(&repo, instance(source.id)).await.unwrap();

        let err = repo
            .transition_status(
                created.uuid,
                MigrationStatus::AssignedBatch,
                MigrationStatus::BackgroundImport,
                "",
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::StaleState {
                found: MigrationStatus::NotAssignedBatch,
                ..
            }
        ));
    }

    async fn batch(repo: &MemoryRepository, target: &Target) -> Batch {
        BatchRepository::create(
            repo,
            Batch {
                id: 0,
                name: "wave-1".to_string(),
                target_id: target.id,
                status: BatchStatus::Defined,
                status_string: BatchStatus::Defined.to_string(),
                storage_pool: "default".to_string(),
                include_expression: "true".to_string(),
                migration_window_start: None,
                migration_window_end: None,
                default_network: String::new(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_assign_batch_refuses_disabled_instance() {
        let (repo, source, target) = seeded().await;
        let batch = batch(&repo, &target).await;
        let created = InstanceRepository::create(&repo, instance(source.id)).await.unwrap();
        repo.create_overrides(Overrides {
            disable_migration: true,
            ..Overrides::new(created.uuid)
        })
        .await
        .unwrap();

        let err = repo
            .assign_batch(created.uuid, batch.id, target.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::OperationNotPermitted(_)));

        let stored = repo.get_by_uuid(created.uuid).await.unwrap();
        assert_eq!(stored.batch_id, None);
        assert_eq!(stored.migration_status, MigrationStatus::NotAssignedBatch);
    }

    #[tokio::test]
    async fn test_delete_with_overrides_is_all_or_nothing() {
        let (repo, source, target) = seeded().await;
        let batch = batch(&repo, &target).await;
        let created = InstanceRepository::create(&repo, instance(source.id)).await.unwrap();
        repo.create_overrides(Overrides::new(created.uuid)).await.unwrap();
        repo.assign_batch(created.uuid, batch.id, target.id).await.unwrap();

        let err = repo
            .delete_with_overrides_by_uuid(created.uuid)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::OperationNotPermitted(_)));
        assert!(repo.get_overrides_by_uuid(created.uuid).await.is_ok());

        repo.unassign_batch(created.uuid).await.unwrap();
        repo.delete_with_overrides_by_uuid(created.uuid).await.unwrap();
        assert!(repo.get_by_uuid(created.uuid).await.unwrap_err().is_not_found());
        assert!(repo
            .get_overrides_by_uuid(created.uuid)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_batch_delete_waits_for_settled_members() {
        let (repo, source, target) = seeded().await;
        let batch = batch(&repo, &target).await;
        let created = InstanceRepository::create(&repo, instance(source.id)).await.unwrap();
        repo.assign_batch(created.uuid, batch.id, target.id).await.unwrap();

        let err = BatchRepository::delete_by_name(&repo, "wave-1")
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::OperationNotPermitted(_)));

        repo.update_status_by_uuid(created.uuid, MigrationStatus::Migrated, "done", false)
            .await
            .unwrap();
        BatchRepository::delete_by_name(&repo, "wave-1").await.unwrap();

        let stored = repo.get_by_uuid(created.uuid).await.unwrap();
        assert_eq!(stored.batch_id, None);
        assert_eq!(stored.migration_status, MigrationStatus::Migrated);
    }
}
