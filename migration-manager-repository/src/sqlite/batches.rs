use async_trait::async_trait;
use migration_manager_shared::{Batch, BatchStatus, MigrationStatus};
use sqlx::SqliteConnection;

use super::codec::{batch_from_row, encode_timestamp, BATCH_COLUMNS};
use super::instances::fetch_batch_members;
use super::{transaction, SqliteRepository};
use crate::errors::RepositoryError;
use crate::interfaces::BatchRepository;
use crate::rules;

async fn fetch_batch_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Batch, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE name = ?"))
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::not_found(format!("batch {name:?}")))?;
    batch_from_row(&row)
}

async fn fetch_batch_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Batch, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::not_found(format!("batch with id {id}")))?;
    batch_from_row(&row)
}

#[async_trait]
impl BatchRepository for SqliteRepository {
    async fn create(&self, batch: Batch) -> Result<Batch, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO batches (
                name, target_id, status, status_string, storage_pool, include_expression,
                migration_window_start, migration_window_end, default_network
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&batch.name)
        .bind(batch.target_id)
        .bind(batch.status.as_str())
        .bind(&batch.status_string)
        .bind(&batch.storage_pool)
        .bind(&batch.include_expression)
        .bind(batch.migration_window_start.as_ref().map(encode_timestamp))
        .bind(batch.migration_window_end.as_ref().map(encode_timestamp))
        .bind(&batch.default_network)
        .execute(&self.pool)
        .await?;

        Ok(Batch {
            id: result.last_insert_rowid(),
            ..batch
        })
    }

    async fn get_all(&self) -> Result<Vec<Batch>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM batches ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(batch_from_row).collect()
    }

    async fn get_all_names(&self) -> Result<Vec<String>, RepositoryError> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM batches ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn get_by_id(&self, id: i64) -> Result<Batch, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_batch_by_id(&mut conn, id).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Batch, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_batch_by_name(&mut conn, name).await
    }

    async fn update_by_id(&self, batch: Batch) -> Result<(), RepositoryError> {
        transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let stored = fetch_batch_by_id(conn, batch.id).await?;
                let members = fetch_batch_members(conn, stored.id).await?;
                rules::ensure_no_member_migrating(&stored.name, &members)?;

                sqlx::query(
                    r#"
                    UPDATE batches SET
                        name = ?, target_id = ?, storage_pool = ?, include_expression = ?,
                        migration_window_start = ?, migration_window_end = ?, default_network = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&batch.name)
                .bind(batch.target_id)
                .bind(&batch.storage_pool)
                .bind(&batch.include_expression)
                .bind(batch.migration_window_start.as_ref().map(encode_timestamp))
                .bind(batch.migration_window_end.as_ref().map(encode_timestamp))
                .bind(&batch.default_network)
                .bind(batch.id)
                .execute(&mut *conn)
                .await?;

                if stored.target_id != batch.target_id {
                    sqlx::query(
                        "UPDATE instances SET target_id = ? WHERE batch_id = ? AND migration_status = ?",
                    )
                    .bind(batch.target_id)
                    .bind(batch.id)
                    .bind(MigrationStatus::AssignedBatch.as_str())
                    .execute(&mut *conn)
                    .await?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn update_status_by_name(
        &self,
        name: &str,
        status: BatchStatus,
        status_string: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE batches SET status = ?, status_string = ? WHERE name = ?")
            .bind(status.as_str())
            .bind(status_string)
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(format!("batch {name:?}")));
        }
        Ok(())
    }

    async fn delete_by_name(&self, name: &str) -> Result<(), RepositoryError> {
        let name = name.to_string();
        transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let batch = fetch_batch_by_name(conn, &name).await?;
                let members = fetch_batch_members(conn, batch.id).await?;
                rules::ensure_members_settled(&batch.name, &members)?;

                sqlx::query("UPDATE instances SET batch_id = NULL WHERE batch_id = ?")
                    .bind(batch.id)
                    .execute(&mut *conn)
                    .await?;

                sqlx::query("DELETE FROM batches WHERE id = ?")
                    .bind(batch.id)
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .await
    }
}
