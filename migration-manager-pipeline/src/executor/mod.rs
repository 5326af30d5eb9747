//! Executor module for the migration manager pipeline.
//!
//! Provides the `TargetExecutor` trait implemented by target platform
//! clients, the `MigrationPlan` handed to them, and the worker that advances
//! the members of running batches one step per tick.
mod worker;

pub use worker::{MigrationWorker, WorkerReport};

use async_trait::async_trait;
use migration_manager_shared::{Batch, Instance, InstanceDiskInfo, InstanceNicInfo, Target};
use uuid::Uuid;

use crate::errors::ExecutionError;

/// Which disk sync `import_disks` should perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Differential sync while the source instance keeps running.
    Background,
    /// Last sync after the source instance has been shut down.
    Final,
}

/// A client able to migrate instances onto one kind of target.
///
/// Every call may be retried after a partial failure and must be idempotent:
/// provisioning an already provisioned instance, or re-importing disks that
/// were already copied, has to succeed without redoing finished work.
#[async_trait]
pub trait TargetExecutor: Send + Sync {
    /// Creates the instance on the target.
    async fn provision(&self, target: &Target, plan: &MigrationPlan) -> Result<(), ExecutionError>;

    /// Copies disk data from the source to the target.
    async fn import_disks(
        &self,
        target: &Target,
        plan: &MigrationPlan,
        mode: ImportMode,
    ) -> Result<(), ExecutionError>;

    /// Starts the instance on the target and retires the source copy.
    async fn cutover(&self, target: &Target, plan: &MigrationPlan) -> Result<(), ExecutionError>;
}

/// The effective configuration an instance is created with on its target.
///
/// CPU and memory come from the overrides when set; network and storage pool
/// come from the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub uuid: Uuid,
    pub name: String,
    pub architecture: String,
    pub cpus: i64,
    pub memory_in_bytes: i64,
    pub storage_pool: String,
    pub network: String,
    pub disks: Vec<InstanceDiskInfo>,
    pub nics: Vec<InstanceNicInfo>,
    pub use_legacy_bios: bool,
    pub secure_boot_enabled: bool,
    pub tpm_present: bool,
    pub secret_token: Uuid,
}

impl MigrationPlan {
    pub fn new(instance: &Instance, batch: &Batch) -> Self {
        Self {
            uuid: instance.uuid,
            name: instance.name().to_string(),
            architecture: instance.architecture.clone(),
            cpus: instance.effective_cpus(),
            memory_in_bytes: instance.effective_memory_in_bytes(),
            storage_pool: batch.storage_pool.clone(),
            network: batch.default_network.clone(),
            disks: instance.disks.clone(),
            nics: instance.nics.clone(),
            use_legacy_bios: instance.use_legacy_bios,
            secure_boot_enabled: instance.secure_boot_enabled,
            tpm_present: instance.tpm_present,
            secret_token: instance.secret_token,
        }
    }
}
