//! Conversions between entities and their SQLite row representation.
//!
//! Timestamps are RFC 3339 text with nanosecond precision, UUIDs hyphenated
//! text, enums their storage code, and structured attributes JSON text.
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use migration_manager_shared::{
    Batch, Instance, Overrides, Source, SourceType, Target, TargetType, ValidationError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::RepositoryError;

pub(crate) const SOURCE_COLUMNS: &str = "id, name, source_type, properties";

pub(crate) const TARGET_COLUMNS: &str = "id, name, target_type, properties";

pub(crate) const BATCH_COLUMNS: &str = "id, name, target_id, status, status_string, storage_pool, \
     include_expression, migration_window_start, migration_window_end, default_network";

/// Instance columns joined with the instance's overrides (if any).
pub(crate) const INSTANCE_SELECT: &str = "SELECT \
     i.uuid AS uuid, i.inventory_path AS inventory_path, i.annotation AS annotation, \
     i.migration_status AS migration_status, i.migration_status_string AS migration_status_string, \
     i.last_update_from_source AS last_update_from_source, i.source_id AS source_id, \
     i.target_id AS target_id, i.batch_id AS batch_id, i.guest_tools_version AS guest_tools_version, \
     i.architecture AS architecture, i.hardware_version AS hardware_version, i.os AS os, \
     i.os_version AS os_version, i.devices AS devices, i.disks AS disks, i.nics AS nics, \
     i.snapshots AS snapshots, i.cpu AS cpu, i.memory AS memory, \
     i.use_legacy_bios AS use_legacy_bios, i.secure_boot_enabled AS secure_boot_enabled, \
     i.tpm_present AS tpm_present, i.needs_disk_import AS needs_disk_import, \
     i.secret_token AS secret_token, \
     o.uuid AS o_uuid, o.last_update AS o_last_update, o.comment AS o_comment, \
     o.number_cpus AS o_number_cpus, o.memory_in_bytes AS o_memory_in_bytes, \
     o.disable_migration AS o_disable_migration \
     FROM instances i LEFT JOIN instance_overrides o ON o.uuid = i.uuid";

pub(crate) const OVERRIDES_SELECT: &str = "SELECT uuid AS o_uuid, last_update AS o_last_update, \
     comment AS o_comment, number_cpus AS o_number_cpus, memory_in_bytes AS o_memory_in_bytes, \
     disable_migration AS o_disable_migration FROM instance_overrides";

pub(crate) fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::corrupt(format!("{column}: {value:?} is not a timestamp: {e}")))
}

pub(crate) fn decode_uuid(column: &str, value: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(value)
        .map_err(|e| RepositoryError::corrupt(format!("{column}: {value:?} is not a uuid: {e}")))
}

fn decode_code<T>(column: &str, value: &str) -> Result<T, RepositoryError>
where
    T: FromStr<Err = ValidationError>,
{
    value
        .parse()
        .map_err(|e: ValidationError| RepositoryError::corrupt(format!("{column}: {}", e.message())))
}

pub(crate) fn encode_json<T: Serialize>(value: &T) -> Result<String, RepositoryError> {
    Ok(serde_json::to_string(value)?)
}

fn decode_json<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T, RepositoryError> {
    let raw: String = row.try_get(column)?;
    Ok(serde_json::from_str(&raw)?)
}

pub(crate) fn source_from_row(row: &SqliteRow) -> Result<Source, RepositoryError> {
    let source_type: String = row.try_get("source_type")?;
    Ok(Source {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        source_type: decode_code::<SourceType>("source_type", &source_type)?,
        properties: decode_json(row, "properties")?,
    })
}

pub(crate) fn target_from_row(row: &SqliteRow) -> Result<Target, RepositoryError> {
    let target_type: String = row.try_get("target_type")?;
    Ok(Target {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        target_type: decode_code::<TargetType>("target_type", &target_type)?,
        properties: decode_json(row, "properties")?,
    })
}

pub(crate) fn batch_from_row(row: &SqliteRow) -> Result<Batch, RepositoryError> {
    let status: String = row.try_get("status")?;
    let window_start: Option<String> = row.try_get("migration_window_start")?;
    let window_end: Option<String> = row.try_get("migration_window_end")?;

    Ok(Batch {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        target_id: row.try_get("target_id")?,
        status: decode_code("status", &status)?,
        status_string: row.try_get("status_string")?,
        storage_pool: row.try_get("storage_pool")?,
        include_expression: row.try_get("include_expression")?,
        migration_window_start: window_start
            .map(|ts| decode_timestamp("migration_window_start", &ts))
            .transpose()?,
        migration_window_end: window_end
            .map(|ts| decode_timestamp("migration_window_end", &ts))
            .transpose()?,
        default_network: row.try_get("default_network")?,
    })
}

/// Decodes the `o_`-prefixed overrides columns; `None` when the join found no row.
pub(crate) fn overrides_from_row(row: &SqliteRow) -> Result<Option<Overrides>, RepositoryError> {
    let uuid: Option<String> = row.try_get("o_uuid")?;
    let Some(uuid) = uuid else {
        return Ok(None);
    };
    let last_update: String = row.try_get("o_last_update")?;

    Ok(Some(Overrides {
        uuid: decode_uuid("o_uuid", &uuid)?,
        last_update: decode_timestamp("o_last_update", &last_update)?,
        comment: row.try_get("o_comment")?,
        number_cpus: row.try_get("o_number_cpus")?,
        memory_in_bytes: row.try_get("o_memory_in_bytes")?,
        disable_migration: row.try_get("o_disable_migration")?,
    }))
}

pub(crate) fn instance_from_row(row: &SqliteRow) -> Result<Instance, RepositoryError> {
    let uuid: String = row.try_get("uuid")?;
    let status: String = row.try_get("migration_status")?;
    let last_update: String = row.try_get("last_update_from_source")?;
    let secret_token: String = row.try_get("secret_token")?;

    Ok(Instance {
        uuid: decode_uuid("uuid", &uuid)?,
        inventory_path: row.try_get("inventory_path")?,
        annotation: row.try_get("annotation")?,
        migration_status: decode_code("migration_status", &status)?,
        migration_status_string: row.try_get("migration_status_string")?,
        last_update_from_source: decode_timestamp("last_update_from_source", &last_update)?,
        source_id: row.try_get("source_id")?,
        target_id: row.try_get("target_id")?,
        batch_id: row.try_get("batch_id")?,
        guest_tools_version: row.try_get("guest_tools_version")?,
        architecture: row.try_get("architecture")?,
        hardware_version: row.try_get("hardware_version")?,
        os: row.try_get("os")?,
        os_version: row.try_get("os_version")?,
        devices: decode_json(row, "devices")?,
        disks: decode_json(row, "disks")?,
        nics: decode_json(row, "nics")?,
        snapshots: decode_json(row, "snapshots")?,
        cpu: decode_json(row, "cpu")?,
        memory: decode_json(row, "memory")?,
        use_legacy_bios: row.try_get("use_legacy_bios")?,
        secure_boot_enabled: row.try_get("secure_boot_enabled")?,
        tpm_present: row.try_get("tpm_present")?,
        needs_disk_import: row.try_get("needs_disk_import")?,
        secret_token: decode_uuid("secret_token", &secret_token)?,
        overrides: overrides_from_row(row)?,
    })
}
