use async_trait::async_trait;
use migration_manager_shared::Target;

use super::codec::{encode_json, target_from_row, TARGET_COLUMNS};
use super::SqliteRepository;
use crate::errors::RepositoryError;
use crate::interfaces::TargetRepository;

#[async_trait]
impl TargetRepository for SqliteRepository {
    async fn create(&self, target: Target) -> Result<Target, RepositoryError> {
        let result = sqlx::query("INSERT INTO targets (name, target_type, properties) VALUES (?, ?, ?)")
            .bind(&target.name)
            .bind(target.target_type.as_str())
            .bind(encode_json(&target.properties)?)
            .execute(&self.pool)
            .await?;

        Ok(Target {
            id: result.last_insert_rowid(),
            ..target
        })
    }

    async fn get_all(&self) -> Result<Vec<Target>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {TARGET_COLUMNS} FROM targets ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(target_from_row).collect()
    }

    async fn get_all_names(&self) -> Result<Vec<String>, RepositoryError> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM targets ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn get_by_id(&self, id: i64) -> Result<Target, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TARGET_COLUMNS} FROM targets WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("target with id {id}")))?;
        target_from_row(&row)
    }

    async fn get_by_name(&self, name: &str) -> Result<Target, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TARGET_COLUMNS} FROM targets WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("target {name:?}")))?;
        target_from_row(&row)
    }

    async fn update_by_id(&self, target: Target) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE targets SET name = ?, target_type = ?, properties = ? WHERE id = ?")
                .bind(&target.name)
                .bind(target.target_type.as_str())
                .bind(encode_json(&target.properties)?)
                .bind(target.id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(format!("target with id {}", target.id)));
        }
        Ok(())
    }

    async fn delete_by_name(&self, name: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM targets WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(format!("target {name:?}")));
        }
        Ok(())
    }
}
