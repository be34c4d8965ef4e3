//! Transfer Database Layer
//!
//! `transfers.volume_id` is UNIQUE and references `volumes(id) ON DELETE
//! CASCADE`, so the one-live-transfer-per-volume rule and the cascade on
//! volume destroy are both enforced by PostgreSQL.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::error::TransferError;
use super::types::TransferRecord;
use crate::core_types::TransferId;

/// Persistence for transfer records
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Insert a record; fails with `InvalidVolume` if the volume already has one
    async fn create(&self, record: &TransferRecord) -> Result<(), TransferError>;

    /// Get a record by ID, regardless of owner
    async fn get(&self, id: TransferId) -> Result<Option<TransferRecord>, TransferError>;

    /// Records whose volume is currently owned by `project_id`, or all records
    /// when `None`, oldest first
    async fn list(&self, project_id: Option<&str>) -> Result<Vec<TransferRecord>, TransferError>;

    /// Remove a record; returns false if it did not exist
    async fn delete(&self, id: TransferId) -> Result<bool, TransferError>;
}

pub struct PgTransferStore {
    pool: PgPool,
}

impl PgTransferStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> Result<TransferRecord, TransferError> {
        Ok(TransferRecord {
            id: row.try_get("id")?,
            volume_id: row.try_get("volume_id")?,
            display_name: row.try_get("display_name")?,
            crypt_hash: row.try_get("crypt_hash")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl TransferStore for PgTransferStore {
    async fn create(&self, record: &TransferRecord) -> Result<(), TransferError> {
        let result = sqlx::query(
            r#"
            INSERT INTO transfers (id, volume_id, display_name, crypt_hash, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id)
        .bind(record.volume_id)
        .bind(&record.display_name)
        .bind(&record.crypt_hash)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(TransferError::InvalidVolume(format!(
                    "volume {} already has a pending transfer",
                    record.volume_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: TransferId) -> Result<Option<TransferRecord>, TransferError> {
        let row = sqlx::query(
            r#"
            SELECT id, volume_id, display_name, crypt_hash, created_at
            FROM transfers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn list(&self, project_id: Option<&str>) -> Result<Vec<TransferRecord>, TransferError> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.volume_id, t.display_name, t.crypt_hash, t.created_at
            FROM transfers t
            JOIN volumes v ON v.id = t.volume_id
            WHERE $1::TEXT IS NULL OR v.project_id = $1
            ORDER BY t.created_at
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn delete(&self, id: TransferId) -> Result<bool, TransferError> {
        let result = sqlx::query("DELETE FROM transfers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
