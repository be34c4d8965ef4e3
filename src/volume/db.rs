//! Volume Database Layer
//!
//! PostgreSQL-backed volume records. Status changes use a single
//! `UPDATE ... WHERE status = $expected` so the CAS is atomic in the database.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::lazy::{Metadata, VolumeFieldLoader};
use super::store::VolumeStore;
use super::types::{VolumeRecord, VolumeStatus, VolumeType, VolumeUpdate};
use crate::core_types::VolumeId;
use crate::transfer::TransferError;

const VOLUME_COLUMNS: &str = "id, status, project_id, user_id, volume_type_id, size, display_name, created_at, updated_at";

pub struct PgVolumeStore {
    pool: PgPool,
}

impl PgVolumeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> Result<VolumeRecord, TransferError> {
        Ok(VolumeRecord {
            id: row.try_get("id")?,
            status: VolumeStatus::from(row.try_get::<String, _>("status")?.as_str()),
            project_id: row.try_get("project_id")?,
            user_id: row.try_get("user_id")?,
            volume_type_id: row.try_get("volume_type_id")?,
            size: row.try_get("size")?,
            display_name: row.try_get("display_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Register a volume type (used by hosts seeding the catalogue)
    pub async fn upsert_volume_type(&self, volume_type: &VolumeType) -> Result<(), TransferError> {
        let extra_specs = serde_json::to_value(&volume_type.extra_specs)
            .map_err(|e| TransferError::SystemError(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO volume_types (id, name, extra_specs)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, extra_specs = EXCLUDED.extra_specs
            "#,
        )
        .bind(&volume_type.id)
        .bind(&volume_type.name)
        .bind(extra_specs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_key_values(&self, table: &str, id: VolumeId) -> Result<Metadata, TransferError> {
        let rows: Vec<(String, String)> = sqlx::query_as(&format!(
            "SELECT key, value FROM {} WHERE volume_id = $1",
            table
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

#[async_trait]
impl VolumeStore for PgVolumeStore {
    async fn create(&self, volume: &VolumeRecord) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            INSERT INTO volumes
                (id, status, project_id, user_id, volume_type_id, size, display_name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(volume.id)
        .bind(volume.status.as_str())
        .bind(&volume.project_id)
        .bind(&volume.user_id)
        .bind(&volume.volume_type_id)
        .bind(volume.size)
        .bind(&volume.display_name)
        .bind(volume.created_at)
        .bind(volume.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: VolumeId) -> Result<Option<VolumeRecord>, TransferError> {
        let row = sqlx::query(&format!("SELECT {} FROM volumes WHERE id = $1", VOLUME_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn list_by_project(&self, project_id: &str) -> Result<Vec<VolumeRecord>, TransferError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM volumes WHERE project_id = $1 ORDER BY created_at",
            VOLUME_COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn conditional_update(
        &self,
        id: VolumeId,
        expected: &VolumeStatus,
        update: &VolumeUpdate,
    ) -> Result<bool, TransferError> {
        let result = sqlx::query(
            r#"
            UPDATE volumes
            SET status = COALESCE($1, status),
                project_id = COALESCE($2, project_id),
                user_id = COALESCE($3, user_id),
                updated_at = NOW()
            WHERE id = $4 AND status = $5
            "#,
        )
        .bind(update.status.as_ref().map(|s| s.as_str().to_string()))
        .bind(&update.project_id)
        .bind(&update.user_id)
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn destroy(&self, id: VolumeId) -> Result<bool, TransferError> {
        // transfers, volume_metadata and volume_admin_metadata cascade
        let result = sqlx::query("DELETE FROM volumes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl VolumeFieldLoader for PgVolumeStore {
    async fn load_metadata(&self, id: VolumeId) -> Result<Metadata, TransferError> {
        self.load_key_values("volume_metadata", id).await
    }

    async fn load_admin_metadata(&self, id: VolumeId) -> Result<Metadata, TransferError> {
        self.load_key_values("volume_admin_metadata", id).await
    }

    async fn load_volume_type(&self, type_id: &str) -> Result<Option<VolumeType>, TransferError> {
        let row: Option<(String, String, serde_json::Value)> =
            sqlx::query_as("SELECT id, name, extra_specs FROM volume_types WHERE id = $1")
                .bind(type_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(id, name, extra_specs)| {
            let extra_specs = serde_json::from_value(extra_specs)
                .map_err(|e| TransferError::SystemError(e.to_string()))?;
            Ok(VolumeType {
                id,
                name,
                extra_specs,
            })
        })
        .transpose()
    }
}
