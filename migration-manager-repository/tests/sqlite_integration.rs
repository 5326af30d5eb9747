//! Integration tests for the SQLite repositories and the services on top of them.
//!
//! Each test gets a fresh database file inside a temporary directory, with
//! the embedded migrations applied.
//!
//! Run with: `cargo test --test sqlite_integration`

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use migration_manager_repository::{
    BatchRepository, BatchService, InstanceRepository, InstanceService, RepositoryError,
    SourceRepository, SourceService, SqliteConfig, SqliteRepository, TargetRepository,
    TargetService,
};
use migration_manager_shared::{
    Batch, BatchStatus, ErrorClass, Instance, InstanceCpuInfo, InstanceDeviceInfo,
    InstanceDiskInfo, InstanceMemoryInfo, InstanceNicInfo, InstanceSnapshotInfo, MigrationStatus,
    Overrides, Source, SourceType, Target, TargetType,
};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

struct Fixture {
    _dir: TempDir,
    repo: Arc<SqliteRepository>,
    source: Source,
    target: Target,
}

impl Fixture {
    fn instances(&self) -> InstanceService {
        InstanceService::new(self.repo.clone(), self.repo.clone(), self.repo.clone())
    }

    fn batches(&self) -> BatchService {
        BatchService::new(self.repo.clone(), self.repo.clone(), self.repo.clone())
    }
}

async fn open_repository() -> (TempDir, Arc<SqliteRepository>) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("migration-manager.db").display());
    let repo = SqliteRepository::connect(&SqliteConfig::new(url)).await.unwrap();
    repo.run_migrations().await.unwrap();
    (dir, Arc::new(repo))
}

fn make_source(name: &str) -> Source {
    Source {
        id: 0,
        name: name.to_string(),
        source_type: SourceType::VMware,
        properties: json!({
            "endpoint": "https://vcenter.local",
            "username": "admin",
            "password": "secret",
            "insecure": true
        }),
    }
}

fn make_target(name: &str) -> Target {
    Target {
        id: 0,
        name: name.to_string(),
        target_type: TargetType::Incus,
        properties: json!({
            "endpoint": "https://incus.local:8443",
            "tls_client_cert": "-----BEGIN CERTIFICATE-----",
            "oidc_tokens": {"access_token": "abc"}
        }),
    }
}

fn make_instance(source_id: i64, path: &str) -> Instance {
    Instance {
        uuid: Uuid::new_v4(),
        inventory_path: path.to_string(),
        annotation: "owner: ops".to_string(),
        migration_status: MigrationStatus::NotAssignedBatch,
        migration_status_string: MigrationStatus::NotAssignedBatch.to_string(),
        last_update_from_source: Utc::now(),
        source_id,
        target_id: None,
        batch_id: None,
        guest_tools_version: 12352,
        architecture: "x86_64".to_string(),
        hardware_version: "vmx-21".to_string(),
        os: "Ubuntu".to_string(),
        os_version: "24.04".to_string(),
        devices: vec![InstanceDeviceInfo {
            device_type: "cdrom".to_string(),
            label: "CD/DVD drive 1".to_string(),
            summary: "Remote device".to_string(),
        }],
        disks: vec![
            InstanceDiskInfo {
                name: "[datastore1] vm/vm.vmdk".to_string(),
                differential_sync_supported: true,
                size_in_bytes: 21_474_836_480,
            },
            InstanceDiskInfo {
                name: "[datastore1] vm/vm_1.vmdk".to_string(),
                differential_sync_supported: false,
                size_in_bytes: 1_073_741_824,
            },
        ],
        nics: vec![
            InstanceNicInfo {
                network: "VM Network".to_string(),
                hwaddr: "00:50:56:aa:bb:cc".to_string(),
            },
            InstanceNicInfo {
                network: "Storage".to_string(),
                hwaddr: "00:50:56:aa:bb:cd".to_string(),
            },
        ],
        snapshots: vec![InstanceSnapshotInfo {
            name: "before-upgrade".to_string(),
            description: String::new(),
            creation_time: Utc::now(),
            id: 7,
        }],
        cpu: InstanceCpuInfo {
            number_cpus: 4,
            cpu_affinity: vec![3, 0, 2],
            number_of_cores_per_socket: 2,
        },
        memory: InstanceMemoryInfo {
            memory_in_bytes: 8_589_934_592,
            memory_reservation_in_bytes: 1_073_741_824,
        },
        use_legacy_bios: false,
        secure_boot_enabled: true,
        tpm_present: true,
        needs_disk_import: false,
        secret_token: Uuid::new_v4(),
        overrides: None,
    }
}

fn make_batch(target_id: i64, name: &str, expression: &str) -> Batch {
    Batch {
        id: 0,
        name: name.to_string(),
        target_id,
        status: BatchStatus::Defined,
        status_string: BatchStatus::Defined.to_string(),
        storage_pool: "default".to_string(),
        include_expression: expression.to_string(),
        migration_window_start: None,
        migration_window_end: None,
        default_network: "lan".to_string(),
    }
}

async fn setup() -> Fixture {
    let (dir, repo) = open_repository().await;
    let source = SourceRepository::create(repo.as_ref(), make_source("vcenter"))
        .await
        .unwrap();
    let target = TargetRepository::create(repo.as_ref(), make_target("incus"))
        .await
        .unwrap();
    Fixture {
        _dir: dir,
        repo,
        source,
        target,
    }
}

// ============================================================================
// Sources and targets
// ============================================================================

#[tokio::test]
async fn test_source_round_trip() {
    let f = setup().await;
    let repo = f.repo.as_ref();

    let by_id = SourceRepository::get_by_id(repo, f.source.id).await.unwrap();
    let by_name = SourceRepository::get_by_name(repo, "vcenter").await.unwrap();
    assert_eq!(by_id, f.source);
    assert_eq!(by_name, f.source);
    assert_eq!(
        SourceRepository::get_all_names(repo).await.unwrap(),
        vec!["vcenter".to_string()]
    );
}

#[tokio::test]
async fn test_target_round_trip_keeps_nested_properties() {
    let f = setup().await;
    let repo = f.repo.as_ref();

    let stored = TargetRepository::get_by_name(repo, "incus").await.unwrap();
    assert_eq!(stored, f.target);
    assert_eq!(stored.properties["oidc_tokens"]["access_token"], "abc");
}

#[tokio::test]
async fn test_duplicate_source_name_is_a_constraint_violation() {
    let f = setup().await;
    let err = SourceRepository::create(f.repo.as_ref(), make_source("vcenter"))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::ConstraintViolation);
}

#[tokio::test]
async fn test_source_update_and_missing_rows() {
    let f = setup().await;
    let repo = f.repo.as_ref();

    let mut renamed = f.source.clone();
    renamed.name = "vcenter-02".to_string();
    SourceRepository::update_by_id(repo, renamed.clone()).await.unwrap();
    assert_eq!(SourceRepository::get_by_id(repo, f.source.id).await.unwrap(), renamed);

    let mut ghost = renamed.clone();
    ghost.id = 9999;
    assert!(SourceRepository::update_by_id(repo, ghost)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(SourceRepository::delete_by_name(repo, "nope")
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_source_service_rejects_invalid_properties() {
    let f = setup().await;
    let service = SourceService::new(f.repo.clone());

    let mut bad = make_source("broken");
    bad.properties = json!({"endpoint": "https://vc", "username": "", "password": "p"});
    let err = service.create(bad).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
}

#[tokio::test]
async fn test_referenced_source_and_target_can_not_be_deleted() {
    let f = setup().await;
    let instances = f.instances();
    let sources = SourceService::new(f.repo.clone());
    let targets = TargetService::new(f.repo.clone());

    let mut instance = make_instance(f.source.id, "/dc/vm/web-01");
    instance.target_id = Some(f.target.id);
    let instance = instances.create(instance).await.unwrap();

    let err = sources.delete_by_name("vcenter").await.unwrap_err();
    assert!(matches!(err, RepositoryError::ConstraintViolation(_)));
    let err = targets.delete_by_name("incus").await.unwrap_err();
    assert!(matches!(err, RepositoryError::ConstraintViolation(_)));

    instances.delete_by_uuid(instance.uuid).await.unwrap();
    sources.delete_by_name("vcenter").await.unwrap();
    targets.delete_by_name("incus").await.unwrap();
}

// ============================================================================
// Instances
// ============================================================================

#[tokio::test]
async fn test_instance_round_trip_preserves_arrays_and_order() {
    let f = setup().await;
    let created = f
        .instances()
        .create(make_instance(f.source.id, "/dc/vm/db-01"))
        .await
        .unwrap();

    let stored = f.repo.get_by_uuid(created.uuid).await.unwrap();
    assert_eq!(stored, created);
    assert_eq!(stored.cpu.cpu_affinity, vec![3, 0, 2]);
    assert_eq!(stored.disks[0].name, "[datastore1] vm/vm.vmdk");
    assert!(!stored.disks[1].differential_sync_supported);
    assert_eq!(stored.nics[1].hwaddr, "00:50:56:aa:bb:cd");
}

#[tokio::test]
async fn test_instance_create_validates_references() {
    let f = setup().await;
    let instances = f.instances();

    let err = instances
        .create(make_instance(4242, "/dc/vm/orphan"))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);

    let mut no_target = make_instance(f.source.id, "/dc/vm/orphan");
    no_target.target_id = Some(4242);
    let err = instances.create(no_target).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
}

#[tokio::test]
async fn test_duplicate_instance_uuid_is_a_constraint_violation() {
    let f = setup().await;
    let instance = make_instance(f.source.id, "/dc/vm/a");
    f.instances().create(instance.clone()).await.unwrap();

    let err = f.instances().create(instance).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::ConstraintViolation);
}

#[tokio::test]
async fn test_update_refused_while_assigned_to_a_batch() {
    let f = setup().await;
    let instances = f.instances();
    let batch = f
        .batches()
        .create(make_batch(f.target.id, "wave-1", "true"))
        .await
        .unwrap();
    let created = instances
        .create(make_instance(f.source.id, "/dc/vm/app"))
        .await
        .unwrap();

    f.repo
        .assign_batch(created.uuid, batch.id, batch.target_id)
        .await
        .unwrap();
    let assigned = f.repo.get_by_uuid(created.uuid).await.unwrap();
    assert_eq!(assigned.target_id, Some(f.target.id));

    let mut edited = assigned.clone();
    edited.annotation = "edited".to_string();
    let err = instances.update(edited.clone()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::OperationNotPermitted(_)));

    instances.reset(created.uuid).await.unwrap();
    let mut edited = f.repo.get_by_uuid(created.uuid).await.unwrap();
    edited.annotation = "edited".to_string();
    instances.update(edited).await.unwrap();
    assert_eq!(
        f.repo.get_by_uuid(created.uuid).await.unwrap().annotation,
        "edited"
    );
}

#[tokio::test]
async fn test_update_status_is_independent_of_full_update() {
    let f = setup().await;
    let created = f
        .instances()
        .create(make_instance(f.source.id, "/dc/vm/app"))
        .await
        .unwrap();

    f.instances()
        .update_status(created.uuid, MigrationStatus::Disabled, "Migration disabled", true)
        .await
        .unwrap();

    let stored = f.repo.get_by_uuid(created.uuid).await.unwrap();
    assert_eq!(stored.migration_status, MigrationStatus::Disabled);
    assert_eq!(stored.migration_status_string, "Migration disabled");
    assert!(stored.needs_disk_import);
    assert_eq!(stored.os, created.os);

    assert!(f
        .repo
        .update_status_by_uuid(Uuid::new_v4(), MigrationStatus::Error, "", false)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_transition_status_compare_and_set() {
    let f = setup().await;
    let batch = BatchRepository::create(f.repo.as_ref(), make_batch(f.target.id, "wave-1", "true"))
        .await
        .unwrap();
    let created = f
        .instances()
        .create(make_instance(f.source.id, "/dc/vm/app"))
        .await
        .unwrap();
    f.repo
        .assign_batch(created.uuid, batch.id, batch.target_id)
        .await
        .unwrap();

    f.repo
        .transition_status(
            created.uuid,
            MigrationStatus::AssignedBatch,
            MigrationStatus::BackgroundImport,
            "Performing background import tasks",
            true,
        )
        .await
        .unwrap();

    let err = f
        .repo
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
            found: MigrationStatus::BackgroundImport,
            ..
        }
    ));

    let err = f
        .repo
        .transition_status(
            Uuid::new_v4(),
            MigrationStatus::AssignedBatch,
            MigrationStatus::BackgroundImport,
            "",
            true,
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_concurrent_status_updates_never_tear() {
    let f = setup().await;
    let created = f
        .instances()
        .create(make_instance(f.source.id, "/dc/vm/race"))
        .await
        .unwrap();

    let uuid = created.uuid;
    let a = {
        let repo = f.repo.clone();
        tokio::spawn(async move {
            repo.update_status_by_uuid(uuid, MigrationStatus::Error, "Error: a", false)
                .await
        })
    };
    let b = {
        let repo = f.repo.clone();
        tokio::spawn(async move {
            repo.update_status_by_uuid(uuid, MigrationStatus::Disabled, "Migration disabled: b", true)
                .await
        })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let stored = f.repo.get_by_uuid(uuid).await.unwrap();
    match stored.migration_status {
        MigrationStatus::Error => {
            assert_eq!(stored.migration_status_string, "Error: a");
            assert!(!stored.needs_disk_import);
        }
        MigrationStatus::Disabled => {
            assert_eq!(stored.migration_status_string, "Migration disabled: b");
            assert!(stored.needs_disk_import);
        }
        other => panic!("unexpected status {other:?}"),
    }
}

#[tokio::test]
async fn test_instance_delete_rules() {
    let f = setup().await;
    let instances = f.instances();
    let batch = BatchRepository::create(f.repo.as_ref(), make_batch(f.target.id, "wave-1", "true"))
        .await
        .unwrap();
    let created = instances
        .create(make_instance(f.source.id, "/dc/vm/app"))
        .await
        .unwrap();

    f.repo
        .assign_batch(created.uuid, batch.id, batch.target_id)
        .await
        .unwrap();
    let err = f.repo.delete_by_uuid(created.uuid).await.unwrap_err();
    assert!(matches!(err, RepositoryError::OperationNotPermitted(_)));
    f.repo.unassign_batch(created.uuid).await.unwrap();

    instances
        .create_overrides(Overrides::new(created.uuid))
        .await
        .unwrap();
    let err = f.repo.delete_by_uuid(created.uuid).await.unwrap_err();
    assert!(matches!(err, RepositoryError::ConstraintViolation(_)));

    f.repo.delete_overrides_by_uuid(created.uuid).await.unwrap();
    f.repo.delete_by_uuid(created.uuid).await.unwrap();
    assert!(f.repo.get_by_uuid(created.uuid).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_service_delete_cascades_overrides() {
    let f = setup().await;
    let instances = f.instances();
    let created = instances
        .create(make_instance(f.source.id, "/dc/vm/app"))
        .await
        .unwrap();
    instances
        .create_overrides(Overrides::new(created.uuid))
        .await
        .unwrap();

    instances.delete_by_uuid(created.uuid).await.unwrap();
    assert!(f
        .repo
        .get_overrides_by_uuid(created.uuid)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_service_delete_of_migrating_instance_keeps_overrides() {
    let f = setup().await;
    let instances = f.instances();
    let batch = BatchRepository::create(f.repo.as_ref(), make_batch(f.target.id, "wave-1", "true"))
        .await
        .unwrap();
    let created = instances
        .create(make_instance(f.source.id, "/dc/vm/app"))
        .await
        .unwrap();
    instances
        .create_overrides(Overrides::new(created.uuid))
        .await
        .unwrap();
    f.repo
        .assign_batch(created.uuid, batch.id, batch.target_id)
        .await
        .unwrap();

    let err = instances.delete_by_uuid(created.uuid).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::OperationNotPermitted);
    assert!(f.repo.get_overrides_by_uuid(created.uuid).await.is_ok());
}

#[tokio::test]
async fn test_overrides_lifecycle() {
    let f = setup().await;
    let instances = f.instances();

    let err = instances
        .create_overrides(Overrides::new(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let created = instances
        .create(make_instance(f.source.id, "/dc/vm/app"))
        .await
        .unwrap();
    let mut overrides = Overrides::new(created.uuid);
    overrides.number_cpus = 16;
    overrides.comment = "more cores".to_string();
    instances.create_overrides(overrides.clone()).await.unwrap();

    let stored = f.repo.get_by_uuid(created.uuid).await.unwrap();
    assert_eq!(stored.overrides.as_ref(), Some(&overrides));
    assert_eq!(stored.effective_cpus(), 16);

    overrides.disable_migration = true;
    instances.update_overrides(overrides).await.unwrap();
    let stored = instances.get_overrides_by_uuid(created.uuid).await.unwrap();
    assert!(stored.disable_migration);

    let err = instances
        .create_overrides(Overrides::new(created.uuid))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::ConstraintViolation);
}

#[tokio::test]
async fn test_instance_queries() {
    let f = setup().await;
    let instances = f.instances();
    let batch = BatchRepository::create(f.repo.as_ref(), make_batch(f.target.id, "wave-1", "true"))
        .await
        .unwrap();

    let b = instances
        .create(make_instance(f.source.id, "/dc/vm/b"))
        .await
        .unwrap();
    let a = instances
        .create(make_instance(f.source.id, "/dc/vm/a"))
        .await
        .unwrap();
    f.repo.assign_batch(b.uuid, batch.id, batch.target_id).await.unwrap();

    let all: Vec<String> = instances
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.inventory_path)
        .collect();
    assert_eq!(all, vec!["/dc/vm/a".to_string(), "/dc/vm/b".to_string()]);

    let unassigned = instances.get_all_unassigned().await.unwrap();
    assert_eq!(unassigned.len(), 1);
    assert_eq!(unassigned[0].uuid, a.uuid);

    let members = instances.get_all_by_batch(batch.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].uuid, b.uuid);

    let assigned = instances
        .get_all_by_state(MigrationStatus::AssignedBatch)
        .await
        .unwrap();
    assert_eq!(assigned.len(), 1);
    assert_eq!(instances.get_all_by_source(f.source.id).await.unwrap().len(), 2);
}

// ============================================================================
// Batches
// ============================================================================

#[tokio::test]
async fn test_batch_round_trip_with_window() {
    let f = setup().await;
    let start: DateTime<Utc> = Utc::now();
    let mut batch = make_batch(f.target.id, "wave-1", r#"os == "Ubuntu""#);
    batch.migration_window_start = Some(start);
    batch.migration_window_end = Some(start + Duration::hours(4));

    let created = f.batches().create(batch).await.unwrap();
    let stored = BatchRepository::get_by_name(f.repo.as_ref(), "wave-1")
        .await
        .unwrap();
    assert_eq!(stored, created);
    assert_eq!(stored.migration_window_start, Some(start));
}

#[tokio::test]
async fn test_batch_service_validation() {
    let f = setup().await;
    let batches = f.batches();

    let err = batches
        .create(make_batch(f.target.id, "bad", "os =="))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);

    let err = batches
        .create(make_batch(4242, "orphan", "true"))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
}

#[tokio::test]
async fn test_batch_start_and_stop() {
    let f = setup().await;
    let batches = f.batches();
    batches
        .create(make_batch(f.target.id, "wave-1", "true"))
        .await
        .unwrap();

    batches.start("wave-1").await.unwrap();
    assert_eq!(
        batches.get_by_name("wave-1").await.unwrap().status,
        BatchStatus::Ready
    );
    let err = batches.start("wave-1").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::OperationNotPermitted);

    batches.stop("wave-1").await.unwrap();
    assert_eq!(
        batches.get_by_name("wave-1").await.unwrap().status,
        BatchStatus::Stopped
    );
    batches.start("wave-1").await.unwrap();
}

#[tokio::test]
async fn test_batch_delete_refused_until_members_settle() {
    let f = setup().await;
    let batch = f
        .batches()
        .create(make_batch(f.target.id, "wave-1", "true"))
        .await
        .unwrap();
    let waiting = f
        .instances()
        .create(make_instance(f.source.id, "/dc/vm/app"))
        .await
        .unwrap();
    let done = f
        .instances()
        .create(make_instance(f.source.id, "/dc/vm/db"))
        .await
        .unwrap();
    for uuid in [waiting.uuid, done.uuid] {
        f.repo
            .assign_batch(uuid, batch.id, batch.target_id)
            .await
            .unwrap();
    }
    f.repo
        .update_status_by_uuid(done.uuid, MigrationStatus::Migrated, "Migrated", false)
        .await
        .unwrap();

    // An assigned member has not settled yet.
    let err = f.batches().delete_by_name("wave-1").await.unwrap_err();
    assert!(matches!(err, RepositoryError::OperationNotPermitted(_)));
    assert!(f.batches().get_by_name("wave-1").await.is_ok());

    f.instances().reset(waiting.uuid).await.unwrap();
    f.batches().delete_by_name("wave-1").await.unwrap();

    let stored = f.repo.get_by_uuid(done.uuid).await.unwrap();
    assert_eq!(stored.batch_id, None);
    assert_eq!(stored.target_id, Some(f.target.id));
    assert_eq!(stored.migration_status, MigrationStatus::Migrated);
}

#[tokio::test]
async fn test_assign_batch_refuses_disabled_instance() {
    let f = setup().await;
    let batch = f
        .batches()
        .create(make_batch(f.target.id, "wave-1", "true"))
        .await
        .unwrap();
    let created = f
        .instances()
        .create(make_instance(f.source.id, "/dc/vm/app"))
        .await
        .unwrap();
    f.instances()
        .create_overrides(Overrides {
            disable_migration: true,
            ..Overrides::new(created.uuid)
        })
        .await
        .unwrap();

    let err = f
        .repo
        .assign_batch(created.uuid, batch.id, batch.target_id)
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::OperationNotPermitted);

    let stored = f.repo.get_by_uuid(created.uuid).await.unwrap();
    assert_eq!(stored.batch_id, None);
    assert_eq!(stored.migration_status, MigrationStatus::NotAssignedBatch);
}

#[tokio::test]
async fn test_delete_with_overrides_rolls_back_when_refused() {
    let f = setup().await;
    let batch = f
        .batches()
        .create(make_batch(f.target.id, "wave-1", "true"))
        .await
        .unwrap();
    let created = f
        .instances()
        .create(make_instance(f.source.id, "/dc/vm/app"))
        .await
        .unwrap();
    f.instances()
        .create_overrides(Overrides::new(created.uuid))
        .await
        .unwrap();
    // Assigned after the caller last looked at the instance.
    f.repo
        .assign_batch(created.uuid, batch.id, batch.target_id)
        .await
        .unwrap();

    let err = f
        .repo
        .delete_with_overrides_by_uuid(created.uuid)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::OperationNotPermitted(_)));
    assert!(f.repo.get_overrides_by_uuid(created.uuid).await.is_ok());
    assert_eq!(
        f.repo.get_by_uuid(created.uuid).await.unwrap().batch_id,
        Some(batch.id)
    );

    f.repo.unassign_batch(created.uuid).await.unwrap();
    f.repo
        .delete_with_overrides_by_uuid(created.uuid)
        .await
        .unwrap();
    assert!(f.repo.get_by_uuid(created.uuid).await.unwrap_err().is_not_found());
    assert!(f
        .repo
        .get_overrides_by_uuid(created.uuid)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_batch_delete_refused_while_member_migrating() {
    let f = setup().await;
    let batch = f
        .batches()
        .create(make_batch(f.target.id, "wave-1", "true"))
        .await
        .unwrap();
    let created = f
        .instances()
        .create(make_instance(f.source.id, "/dc/vm/app"))
        .await
        .unwrap();
    f.repo
        .assign_batch(created.uuid, batch.id, batch.target_id)
        .await
        .unwrap();
    f.repo
        .transition_status(
            created.uuid,
            MigrationStatus::AssignedBatch,
            MigrationStatus::BackgroundImport,
            "",
            true,
        )
        .await
        .unwrap();

    let err = f.batches().delete_by_name("wave-1").await.unwrap_err();
    assert!(matches!(err, RepositoryError::OperationNotPermitted(_)));

    let mut renamed = batch.clone();
    renamed.name = "wave-renamed".to_string();
    let err = f.batches().update(renamed).await.unwrap_err();
    assert!(matches!(err, RepositoryError::OperationNotPermitted(_)));

    // The target is still referenced by the batch and the member.
    let err = TargetRepository::delete_by_name(f.repo.as_ref(), "incus")
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::ConstraintViolation);
}

#[tokio::test]
async fn test_batch_target_change_follows_assigned_members() {
    let f = setup().await;
    let other = TargetRepository::create(f.repo.as_ref(), make_target("incus-2"))
        .await
        .unwrap();
    let batch = f
        .batches()
        .create(make_batch(f.target.id, "wave-1", "true"))
        .await
        .unwrap();
    let created = f
        .instances()
        .create(make_instance(f.source.id, "/dc/vm/app"))
        .await
        .unwrap();
    f.repo
        .assign_batch(created.uuid, batch.id, batch.target_id)
        .await
        .unwrap();

    let mut retargeted = batch.clone();
    retargeted.target_id = other.id;
    f.batches().update(retargeted).await.unwrap();

    let stored = f.repo.get_by_uuid(created.uuid).await.unwrap();
    assert_eq!(stored.target_id, Some(other.id));
    assert_eq!(
        f.batches().get_by_name("wave-1").await.unwrap().status,
        BatchStatus::Defined
    );
}
