use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ValidationError;
use crate::types::{MigrationStatus, Overrides};
use crate::validation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDiskInfo {
    pub name: String,
    pub differential_sync_supported: bool,
    pub size_in_bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceNicInfo {
    pub network: String,
    pub hwaddr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSnapshotInfo {
    pub name: String,
    pub description: String,
    pub creation_time: DateTime<Utc>,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDeviceInfo {
    pub device_type: String,
    pub label: String,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCpuInfo {
    pub number_cpus: i64,
    pub cpu_affinity: Vec<i32>,
    pub number_of_cores_per_socket: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMemoryInfo {
    pub memory_in_bytes: i64,
    pub memory_reservation_in_bytes: i64,
}

/// One virtual machine tracked through the migration lifecycle.
///
/// `overrides` is never persisted with the instance; repositories attach the
/// instance's overrides row (if any) on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub uuid: Uuid,
    pub inventory_path: String,
    pub annotation: String,
    pub migration_status: MigrationStatus,
    pub migration_status_string: String,
    pub last_update_from_source: DateTime<Utc>,
    pub source_id: i64,
    pub target_id: Option<i64>,
    pub batch_id: Option<i64>,
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
    pub needs_disk_import: bool,
    pub secret_token: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Overrides>,
}

impl Instance {
    /// The last segment of the inventory path.
    pub fn name(&self) -> &str {
        self.inventory_path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&self.inventory_path)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.uuid.is_nil() {
            return Err(ValidationError::new("Invalid instance, uuid can not be nil"));
        }
        validation::non_empty("instance", "inventory path", &self.inventory_path)?;
        validation::non_negative_id("instance", "source id", self.source_id)?;
        validation::optional_non_negative_id("instance", "target id", self.target_id)?;
        validation::optional_non_negative_id("instance", "batch id", self.batch_id)?;
        validation::non_negative("instance", "number of cpus", self.cpu.number_cpus)?;
        validation::non_negative(
            "instance",
            "cores per socket",
            self.cpu.number_of_cores_per_socket,
        )?;
        validation::non_negative("instance", "memory", self.memory.memory_in_bytes)?;
        validation::non_negative(
            "instance",
            "memory reservation",
            self.memory.memory_reservation_in_bytes,
        )?;

        for disk in &self.disks {
            validation::non_empty("instance", "disk name", &disk.name)?;
            validation::non_negative("instance", "disk size", disk.size_in_bytes)?;
        }

        if self.batch_id.is_none()
            && !matches!(
                self.migration_status,
                MigrationStatus::NotAssignedBatch
                    | MigrationStatus::Disabled
                    | MigrationStatus::Migrated
                    | MigrationStatus::Error
            )
        {
            return Err(ValidationError::new(format!(
                "Invalid instance, status {:?} requires a batch",
                self.migration_status
            )));
        }

        Ok(())
    }

    /// Checks that the firmware combination can be reproduced on a target.
    ///
    /// A failure here is not something a retry can fix.
    pub fn validate_firmware(&self) -> Result<(), ValidationError> {
        if self.use_legacy_bios && self.secure_boot_enabled {
            return Err(ValidationError::new(format!(
                "Instance {} has secure boot enabled with a legacy BIOS, which is unsupported",
                self.name()
            )));
        }
        if self.use_legacy_bios && self.tpm_present {
            return Err(ValidationError::new(format!(
                "Instance {} has a TPM with a legacy BIOS, which is unsupported",
                self.name()
            )));
        }
        Ok(())
    }

    pub fn is_migrating(&self) -> bool {
        self.migration_status.is_migrating()
    }

    /// CPU count after applying overrides.
    pub fn effective_cpus(&self) -> i64 {
        match &self.overrides {
            Some(o) if o.number_cpus > 0 => o.number_cpus,
            _ => self.cpu.number_cpus,
        }
    }

    /// Memory size after applying overrides.
    pub fn effective_memory_in_bytes(&self) -> i64 {
        match &self.overrides {
            Some(o) if o.memory_in_bytes > 0 => o.memory_in_bytes,
            _ => self.memory.memory_in_bytes,
        }
    }

    pub fn is_migration_disabled(&self) -> bool {
        self.overrides.as_ref().is_some_and(|o| o.disable_migration)
    }

    /// Whether every disk supports differential (changed-block) sync.
    pub fn supports_background_import(&self) -> bool {
        !self.disks.is_empty() && self.disks.iter().all(|d| d.differential_sync_supported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> Instance {
        Instance {
            uuid: Uuid::new_v4(),
            inventory_path: "/dc/vm/UbuntuVM".to_string(),
            annotation: String::new(),
            migration_status: MigrationStatus::NotAssignedBatch,
            migration_status_string: MigrationStatus::NotAssignedBatch.to_string(),
            last_update_from_source: Utc::now(),
            source_id: 1,
            target_id: None,
            batch_id: None,
            guest_tools_version: 0,
            architecture: "x86_64".to_string(),
            hardware_version: "vmx-21".to_string(),
            os: "Ubuntu".to_string(),
            os_version: "24.04".to_string(),
            devices: vec![],
            disks: vec![InstanceDiskInfo {
                name: "disk0".to_string(),
                differential_sync_supported: true,
                size_in_bytes: 1024,
            }],
            nics: vec![],
            snapshots: vec![],
            cpu: InstanceCpuInfo {
                number_cpus: 2,
                cpu_affinity: vec![],
                number_of_cores_per_socket: 1,
            },
            memory: InstanceMemoryInfo {
                memory_in_bytes: 4096,
                memory_reservation_in_bytes: 0,
            },
            use_legacy_bios: false,
            secure_boot_enabled: false,
            tpm_present: false,
            needs_disk_import: false,
            secret_token: Uuid::new_v4(),
            overrides: None,
        }
    }

    #[test]
    fn test_name_is_last_path_segment() {
        let mut i = instance();
        assert_eq!(i.name(), "UbuntuVM");
        i.inventory_path = "/dc/vm/folder/".to_string();
        assert_eq!(i.name(), "folder");
    }

    #[test]
    fn test_effective_values_honor_non_zero_overrides() {
        let mut i = instance();
        assert_eq!(i.effective_cpus(), 2);
        assert_eq!(i.effective_memory_in_bytes(), 4096);

        let mut overrides = Overrides::new(i.uuid);
        overrides.number_cpus = 8;
        i.overrides = Some(overrides.clone());
        assert_eq!(i.effective_cpus(), 8);
        assert_eq!(i.effective_memory_in_bytes(), 4096);

        overrides.memory_in_bytes = 8192;
        overrides.disable_migration = true;
        i.overrides = Some(overrides);
        assert_eq!(i.effective_memory_in_bytes(), 8192);
        assert!(i.is_migration_disabled());
    }

    #[test]
    fn test_validate() {
        assert!(instance().validate().is_ok());

        let mut nil = instance();
        nil.uuid = Uuid::nil();
        assert!(nil.validate().is_err());

        let mut orphaned = instance();
        orphaned.migration_status = MigrationStatus::FinalImport;
        assert!(orphaned.validate().is_err());

        let mut negative = instance();
        negative.cpu.number_cpus = -1;
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_firmware_combinations() {
        let mut i = instance();
        assert!(i.validate_firmware().is_ok());

        i.secure_boot_enabled = true;
        assert!(i.validate_firmware().is_ok());

        i.use_legacy_bios = true;
        assert!(i.validate_firmware().is_err());
    }

    #[test]
    fn test_background_import_needs_differential_disks() {
        let mut i = instance();
        assert!(i.supports_background_import());
        i.disks.push(InstanceDiskInfo {
            name: "disk1".to_string(),
            differential_sync_supported: false,
            size_in_bytes: 1,
        });
        assert!(!i.supports_background_import());
    }
}
