//! Inventory module for the migration manager pipeline.
//!
//! Provides the `InventorySource` trait implemented by hypervisor clients, the
//! heartbeat that keeps their sessions alive, and the worker that turns a
//! fetched inventory into instance rows.
mod session;
mod sync;

pub use session::KeepAliveSession;
pub use sync::{InventorySync, SyncReport};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use migration_manager_shared::{
    Instance, InstanceCpuInfo, InstanceDeviceInfo, InstanceDiskInfo, InstanceMemoryInfo,
    InstanceNicInfo, InstanceSnapshotInfo, MigrationStatus, Source,
};
use uuid::Uuid;

use crate::errors::ExecutionError;

/// A session-oriented client for one kind of inventory source.
///
/// Implementations hold their own per-source session state; every call names
/// the source it is for.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Logs in to `source`.
    async fn open_session(&self, source: &Source) -> Result<(), ExecutionError>;

    /// Refreshes the session so it does not expire while idle.
    async fn keep_alive(&self, source: &Source) -> Result<(), ExecutionError>;

    /// Lists every virtual machine `source` currently knows about.
    async fn fetch_inventory(&self, source: &Source) -> Result<Vec<InstanceSnapshot>, ExecutionError>;

    /// Logs out of `source`.
    async fn close(&self, source: &Source) -> Result<(), ExecutionError>;
}

/// The inventory fields of one virtual machine, as reported by its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSnapshot {
    pub uuid: Uuid,
    pub inventory_path: String,
    pub annotation: String,
    pub guest_tools_version: i64,
    pub architecture: String,
    pub hardware_version: String,
    pub os: String,
    pub os_version: String,
    pub devices: Vec<InstanceDeviceInfo>,
    pub disks: Vec<InstanceDiskInfo>,
    pub nics: Vec<InstanceNicInfo>,
    pub snapshots: Vec<InstanceSnapshotInfo>,
    pub cpu: InstanceCpuInfo,
    pub memory: InstanceMemoryInfo,
    pub use_legacy_bios: bool,
    pub secure_boot_enabled: bool,
    pub tpm_present: bool,
}

impl InstanceSnapshot {
    /// A new, unassigned instance discovered on `source_id`.
    ///
    /// The instance gets a fresh secret token and still needs its disks imported.
    pub fn into_instance(self, source_id: i64, now: DateTime<Utc>) -> Instance {
        let mut instance = Instance {
            uuid: self.uuid,
            inventory_path: String::new(),
            annotation: String::new(),
            migration_status: MigrationStatus::NotAssignedBatch,
            migration_status_string: MigrationStatus::NotAssignedBatch.to_string(),
            last_update_from_source: now,
            source_id,
            target_id: None,
            batch_id: None,
            guest_tools_version: 0,
            architecture: String::new(),
            hardware_version: String::new(),
            os: String::new(),
            os_version: String::new(),
            devices: vec![],
            disks: vec![],
            nics: vec![],
            snapshots: vec![],
            cpu: InstanceCpuInfo::default(),
            memory: InstanceMemoryInfo::default(),
            use_legacy_bios: false,
            secure_boot_enabled: false,
            tpm_present: false,
            needs_disk_import: true,
            secret_token: Uuid::new_v4(),
            overrides: None,
        };
        self.apply_to(&mut instance, now);
        instance
    }

    /// Overwrites the inventory fields of `instance`, leaving status, batch,
    /// target and token alone.
    pub fn apply_to(self, instance: &mut Instance, now: DateTime<Utc>) {
        instance.inventory_path = self.inventory_path;
        instance.annotation = self.annotation;
        instance.guest_tools_version = self.guest_tools_version;
        instance.architecture = self.architecture;
        instance.hardware_version = self.hardware_version;
        instance.os = self.os;
        instance.os_version = self.os_version;
        instance.devices = self.devices;
        instance.disks = self.disks;
        instance.nics = self.nics;
        instance.snapshots = self.snapshots;
        instance.cpu = self.cpu;
        instance.memory = self.memory;
        instance.use_legacy_bios = self.use_legacy_bios;
        instance.secure_boot_enabled = self.secure_boot_enabled;
        instance.tpm_present = self.tpm_present;
        instance.last_update_from_source = now;
    }
}
