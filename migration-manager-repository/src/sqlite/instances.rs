use async_trait::async_trait;
use migration_manager_shared::{Instance, MigrationStatus, Overrides};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::codec::{
    encode_json, encode_timestamp, instance_from_row, overrides_from_row, INSTANCE_SELECT,
    OVERRIDES_SELECT,
};
use super::{transaction, SqliteRepository};
use crate::errors::RepositoryError;
use crate::interfaces::InstanceRepository;
use crate::rules;

fn instance_not_found(uuid: Uuid) -> RepositoryError {
    RepositoryError::not_found(format!("instance {uuid}"))
}

fn decode_all(rows: Vec<SqliteRow>) -> Result<Vec<Instance>, RepositoryError> {
    rows.iter().map(instance_from_row).collect()
}

pub(crate) async fn fetch_instance(
    conn: &mut SqliteConnection,
    uuid: Uuid,
) -> Result<Instance, RepositoryError> {
    let row = sqlx::query(&format!("{INSTANCE_SELECT} WHERE i.uuid = ?"))
        .bind(uuid.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| instance_not_found(uuid))?;
    instance_from_row(&row)
}

pub(crate) async fn fetch_batch_members(
    conn: &mut SqliteConnection,
    batch_id: i64,
) -> Result<Vec<Instance>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "{INSTANCE_SELECT} WHERE i.batch_id = ? ORDER BY i.inventory_path"
    ))
    .bind(batch_id)
    .fetch_all(&mut *conn)
    .await?;
    decode_all(rows)
}

async fn insert_instance(
    conn: &mut SqliteConnection,
    instance: &Instance,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO instances (
            uuid, inventory_path, annotation, migration_status, migration_status_string,
            last_update_from_source, source_id, target_id, batch_id, guest_tools_version,
            architecture, hardware_version, os, os_version, devices, disks, nics, snapshots,
            cpu, memory, use_legacy_bios, secure_boot_enabled, tpm_present, needs_disk_import,
            secret_token
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(instance.uuid.to_string())
    .bind(&instance.inventory_path)
    .bind(&instance.annotation)
    .bind(instance.migration_status.as_str())
    .bind(&instance.migration_status_string)
    .bind(encode_timestamp(&instance.last_update_from_source))
    .bind(instance.source_id)
    .bind(instance.target_id)
    .bind(instance.batch_id)
    .bind(instance.guest_tools_version)
    .bind(&instance.architecture)
    .bind(&instance.hardware_version)
    .bind(&instance.os)
    .bind(&instance.os_version)
    .bind(encode_json(&instance.devices)?)
    .bind(encode_json(&instance.disks)?)
    .bind(encode_json(&instance.nics)?)
    .bind(encode_json(&instance.snapshots)?)
    .bind(encode_json(&instance.cpu)?)
    .bind(encode_json(&instance.memory)?)
    .bind(instance.use_legacy_bios)
    .bind(instance.secure_boot_enabled)
    .bind(instance.tpm_present)
    .bind(instance.needs_disk_import)
    .bind(instance.secret_token.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl InstanceRepository for SqliteRepository {
    async fn create(&self, instance: Instance) -> Result<Instance, RepositoryError> {
        transaction(&self.pool, move |conn| {
            Box::pin(async move {
                match fetch_instance(conn, instance.uuid).await {
                    Ok(_) => {
                        return Err(RepositoryError::constraint(format!(
                            "instance {} already exists",
                            instance.uuid
                        )))
                    }
                    Err(RepositoryError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
                insert_instance(conn, &instance).await?;
                Ok(Instance {
                    overrides: None,
                    ..instance
                })
            })
        })
        .await
    }

    async fn get_all(&self) -> Result<Vec<Instance>, RepositoryError> {
        let rows = sqlx::query(&format!("{INSTANCE_SELECT} ORDER BY i.inventory_path"))
            .fetch_all(&self.pool)
            .await?;
        decode_all(rows)
    }

    async fn get_all_by_batch(&self, batch_id: i64) -> Result<Vec<Instance>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_batch_members(&mut conn, batch_id).await
    }

    async fn get_all_by_source(&self, source_id: i64) -> Result<Vec<Instance>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{INSTANCE_SELECT} WHERE i.source_id = ? ORDER BY i.inventory_path"
        ))
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn get_all_by_state(
        &self,
        status: MigrationStatus,
    ) -> Result<Vec<Instance>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{INSTANCE_SELECT} WHERE i.migration_status = ? ORDER BY i.inventory_path"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn get_all_unassigned(&self) -> Result<Vec<Instance>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{INSTANCE_SELECT} WHERE i.batch_id IS NULL ORDER BY i.inventory_path"
        ))
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Instance, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_instance(&mut conn, uuid).await
    }

    async fn update_by_uuid(&self, instance: Instance) -> Result<(), RepositoryError> {
        transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let stored = fetch_instance(conn, instance.uuid).await?;
                rules::ensure_updatable(&stored)?;

                sqlx::query(
                    r#"
                    UPDATE instances SET
                        inventory_path = ?, annotation = ?, last_update_from_source = ?,
                        source_id = ?, target_id = ?, guest_tools_version = ?,
                        architecture = ?, hardware_version = ?, os = ?, os_version = ?,
                        devices = ?, disks = ?, nics = ?, snapshots = ?, cpu = ?, memory = ?,
                        use_legacy_bios = ?, secure_boot_enabled = ?, tpm_present = ?
                    WHERE uuid = ?
                    "#,
                )
                .bind(&instance.inventory_path)
                .bind(&instance.annotation)
                .bind(encode_timestamp(&instance.last_update_from_source))
                .bind(instance.source_id)
                .bind(instance.target_id)
                .bind(instance.guest_tools_version)
                .bind(&instance.architecture)
                .bind(&instance.hardware_version)
                .bind(&instance.os)
                .bind(&instance.os_version)
                .bind(encode_json(&instance.devices)?)
                .bind(encode_json(&instance.disks)?)
                .bind(encode_json(&instance.nics)?)
                .bind(encode_json(&instance.snapshots)?)
                .bind(encode_json(&instance.cpu)?)
                .bind(encode_json(&instance.memory)?)
                .bind(instance.use_legacy_bios)
                .bind(instance.secure_boot_enabled)
                .bind(instance.tpm_present)
                .bind(instance.uuid.to_string())
                .execute(&mut *conn)
                .await?;
                Ok(())
            })
        })
        .await
    }

    async fn update_status_by_uuid(
        &self,
        uuid: Uuid,
        status: MigrationStatus,
        status_string: &str,
        needs_disk_import: bool,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE instances SET migration_status = ?, migration_status_string = ?, needs_disk_import = ? WHERE uuid = ?",
        )
        .bind(status.as_str())
        .bind(status_string)
        .bind(needs_disk_import)
        .bind(uuid.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(instance_not_found(uuid));
        }
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
        let status_string = status_string.to_string();
        transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let result = sqlx::query(
                    "UPDATE instances SET migration_status = ?, migration_status_string = ?, needs_disk_import = ? \
                     WHERE uuid = ? AND migration_status = ?",
                )
                .bind(to.as_str())
                .bind(&status_string)
                .bind(needs_disk_import)
                .bind(uuid.to_string())
                .bind(from.as_str())
                .execute(&mut *conn)
                .await?;

                if result.rows_affected() == 0 {
                    let stored = fetch_instance(conn, uuid).await?;
                    return Err(rules::stale(&stored, from));
                }
                Ok(())
            })
        })
        .await
    }

    async fn assign_batch(
        &self,
        uuid: Uuid,
        batch_id: i64,
        target_id: i64,
    ) -> Result<(), RepositoryError> {
        transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let stored = fetch_instance(conn, uuid).await?;
                rules::ensure_assignable(&stored)?;

                sqlx::query(
                    "UPDATE instances SET batch_id = ?, target_id = ?, migration_status = ?, migration_status_string = ? \
                     WHERE uuid = ? AND batch_id IS NULL AND migration_status = ?",
                )
                .bind(batch_id)
                .bind(target_id)
                .bind(MigrationStatus::AssignedBatch.as_str())
                .bind(MigrationStatus::AssignedBatch.to_string())
                .bind(uuid.to_string())
                .bind(MigrationStatus::NotAssignedBatch.as_str())
                .execute(&mut *conn)
                .await?;
                Ok(())
            })
        })
        .await
    }

    async fn unassign_batch(&self, uuid: Uuid) -> Result<(), RepositoryError> {
        transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let stored = fetch_instance(conn, uuid).await?;
                rules::ensure_unassignable(&stored)?;

                sqlx::query(
                    "UPDATE instances SET batch_id = NULL, target_id = NULL, migration_status = ?, migration_status_string = ? \
                     WHERE uuid = ?",
                )
                .bind(MigrationStatus::NotAssignedBatch.as_str())
                .bind(MigrationStatus::NotAssignedBatch.to_string())
                .bind(uuid.to_string())
                .execute(&mut *conn)
                .await?;
                Ok(())
            })
        })
        .await
    }

    async fn delete_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError> {
        transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let stored = fetch_instance(conn, uuid).await?;
                rules::ensure_deletable(&stored)?;

                sqlx::query("DELETE FROM instances WHERE uuid = ?")
                    .bind(uuid.to_string())
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .await
    }

    async fn delete_with_overrides_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError> {
        transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let mut stored = fetch_instance(conn, uuid).await?;
                let had_overrides = stored.overrides.take().is_some();
                rules::ensure_deletable(&stored)?;

                if had_overrides {
                    sqlx::query("DELETE FROM instance_overrides WHERE uuid = ?")
                        .bind(uuid.to_string())
                        .execute(&mut *conn)
                        .await?;
                }
                sqlx::query("DELETE FROM instances WHERE uuid = ?")
                    .bind(uuid.to_string())
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .await
    }

    async fn create_overrides(&self, overrides: Overrides) -> Result<Overrides, RepositoryError> {
        transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let stored = fetch_instance(conn, overrides.uuid).await?;
                if stored.overrides.is_some() {
                    return Err(RepositoryError::constraint(format!(
                        "overrides for instance {} already exist",
                        overrides.uuid
                    )));
                }

                sqlx::query(
                    "INSERT INTO instance_overrides (uuid, last_update, comment, number_cpus, memory_in_bytes, disable_migration) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(overrides.uuid.to_string())
                .bind(encode_timestamp(&overrides.last_update))
                .bind(&overrides.comment)
                .bind(overrides.number_cpus)
                .bind(overrides.memory_in_bytes)
                .bind(overrides.disable_migration)
                .execute(&mut *conn)
                .await?;
                Ok(overrides)
            })
        })
        .await
    }

    async fn get_overrides_by_uuid(&self, uuid: Uuid) -> Result<Overrides, RepositoryError> {
        let row = sqlx::query(&format!("{OVERRIDES_SELECT} WHERE uuid = ?"))
            .bind(uuid.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => overrides_from_row(&row)?
                .ok_or_else(|| RepositoryError::not_found(format!("overrides for instance {uuid}"))),
            None => Err(RepositoryError::not_found(format!(
                "overrides for instance {uuid}"
            ))),
        }
    }

    async fn update_overrides_by_uuid(&self, overrides: Overrides) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE instance_overrides SET last_update = ?, comment = ?, number_cpus = ?, memory_in_bytes = ?, disable_migration = ? \
             WHERE uuid = ?",
        )
        .bind(encode_timestamp(&overrides.last_update))
        .bind(&overrides.comment)
        .bind(overrides.number_cpus)
        .bind(overrides.memory_in_bytes)
        .bind(overrides.disable_migration)
        .bind(overrides.uuid.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(format!(
                "overrides for instance {}",
                overrides.uuid
            )));
        }
        Ok(())
    }

    async fn delete_overrides_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM instance_overrides WHERE uuid = ?")
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(format!(
                "overrides for instance {uuid}"
            )));
        }
        Ok(())
    }
}
