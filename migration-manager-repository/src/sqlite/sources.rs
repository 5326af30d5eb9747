use async_trait::async_trait;
use migration_manager_shared::Source;

use super::codec::{encode_json, source_from_row, SOURCE_COLUMNS};
use super::SqliteRepository;
use crate::errors::RepositoryError;
use crate::interfaces::SourceRepository;

#[async_trait]
impl SourceRepository for SqliteRepository {
    async fn create(&self, source: Source) -> Result<Source, RepositoryError> {
        let result = sqlx::query("INSERT INTO sources (name, source_type, properties) VALUES (?, ?, ?)")
            .bind(&source.name)
            .bind(source.source_type.as_str())
            .bind(encode_json(&source.properties)?)
            .execute(&self.pool)
            .await?;

        Ok(Source {
            id: result.last_insert_rowid(),
            ..source
        })
    }

    async fn get_all(&self) -> Result<Vec<Source>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM sources ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(source_from_row).collect()
    }

    async fn get_all_names(&self) -> Result<Vec<String>, RepositoryError> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM sources ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn get_by_id(&self, id: i64) -> Result<Source, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("source with id {id}")))?;
        source_from_row(&row)
    }

    async fn get_by_name(&self, name: &str) -> Result<Source, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("source {name:?}")))?;
        source_from_row(&row)
    }

    async fn update_by_id(&self, source: Source) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE sources SET name = ?, source_type = ?, properties = ? WHERE id = ?")
                .bind(&source.name)
                .bind(source.source_type.as_str())
                .bind(encode_json(&source.properties)?)
                .bind(source.id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(format!("source with id {}", source.id)));
        }
        Ok(())
    }

    async fn delete_by_name(&self, name: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM sources WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(format!("source {name:?}")));
        }
        Ok(())
    }
}
