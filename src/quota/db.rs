//! PostgreSQL quota ledger.
//!
//! Usage rows are locked with `SELECT ... FOR UPDATE` inside one transaction
//! per reserve/commit/rollback. Resources are visited in sorted order so two
//! reservations on the same project always lock rows in the same sequence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{QuotaDeltas, QuotaError, QuotaLedger, QuotaLimits, QuotaUsage, Reservation, check_headroom};

pub struct PgQuotaLedger {
    pool: PgPool,
    limits: QuotaLimits,
}

impl PgQuotaLedger {
    pub fn new(pool: PgPool, limits: QuotaLimits) -> Self {
        Self { pool, limits }
    }

    async fn lock_usage(
        tx: &mut Transaction<'_, Postgres>,
        project_id: &str,
        resource: &str,
    ) -> Result<(i64, i64), QuotaError> {
        sqlx::query(
            r#"
            INSERT INTO quota_usages (project_id, resource, in_use, reserved, updated_at)
            VALUES ($1, $2, 0, 0, NOW())
            ON CONFLICT (project_id, resource) DO NOTHING
            "#,
        )
        .bind(project_id)
        .bind(resource)
        .execute(&mut **tx)
        .await?;

        let row: (i64, i64) = sqlx::query_as(
            r#"
            SELECT in_use, reserved FROM quota_usages
            WHERE project_id = $1 AND resource = $2
            FOR UPDATE
            "#,
        )
        .bind(project_id)
        .bind(resource)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row)
    }

    /// Delete the reservation rows and fold them into usage.
    ///
    /// Returns false when no rows existed for `id`.
    async fn settle(&self, id: Uuid, commit: bool) -> Result<bool, QuotaError> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            DELETE FROM reservations WHERE id = $1
            RETURNING project_id, resource, delta
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        if rows.is_empty() {
            return Ok(false);
        }

        for (project_id, resource, delta) in rows {
            let applied = if commit { delta } else { 0 };
            let held = if delta >= 0 { delta } else { 0 };
            sqlx::query(
                r#"
                UPDATE quota_usages
                SET in_use = GREATEST(in_use + $1, 0),
                    reserved = reserved - $2,
                    updated_at = NOW()
                WHERE project_id = $3 AND resource = $4
                "#,
            )
            .bind(applied)
            .bind(held)
            .bind(&project_id)
            .bind(&resource)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl QuotaLedger for PgQuotaLedger {
    async fn reserve(
        &self,
        project_id: &str,
        deltas: &QuotaDeltas,
    ) -> Result<Reservation, QuotaError> {
        let mut tx = self.pool.begin().await?;

        for (resource, delta) in deltas.iter() {
            let (in_use, reserved) = Self::lock_usage(&mut tx, project_id, resource).await?;
            let usage = QuotaUsage {
                in_use,
                reserved,
                limit: self.limits.limit_for(project_id, resource),
            };
            // Dropping `tx` on error rolls back the row locks
            check_headroom(resource, delta, usage)?;
        }

        let reservation = Reservation {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            deltas: deltas.clone(),
            expires_at: Utc::now() + self.limits.reservation_ttl(),
        };

        for (resource, delta) in deltas.iter() {
            if delta > 0 {
                sqlx::query(
                    r#"
                    UPDATE quota_usages SET reserved = reserved + $1, updated_at = NOW()
                    WHERE project_id = $2 AND resource = $3
                    "#,
                )
                .bind(delta)
                .bind(project_id)
                .bind(resource)
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query(
                r#"
                INSERT INTO reservations (id, project_id, resource, delta, expires_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(reservation.id)
            .bind(project_id)
            .bind(resource)
            .bind(delta)
            .bind(reservation.expires_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(reservation_id = %reservation.id, project_id, "Quota reserved");
        Ok(reservation)
    }

    async fn commit(&self, reservation: &Reservation) -> Result<(), QuotaError> {
        if !self.settle(reservation.id, true).await? {
            return Err(QuotaError::UnknownReservation(reservation.id));
        }
        Ok(())
    }

    async fn rollback(&self, reservation: &Reservation) -> Result<(), QuotaError> {
        if !self.settle(reservation.id, false).await? {
            return Err(QuotaError::UnknownReservation(reservation.id));
        }
        Ok(())
    }

    async fn usage(&self, project_id: &str, resource: &str) -> Result<QuotaUsage, QuotaError> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT in_use, reserved FROM quota_usages WHERE project_id = $1 AND resource = $2",
        )
        .bind(project_id)
        .bind(resource)
        .fetch_optional(&self.pool)
        .await?;

        let (in_use, reserved) = row.unwrap_or((0, 0));
        Ok(QuotaUsage {
            in_use,
            reserved,
            limit: self.limits.limit_for(project_id, resource),
        })
    }

    async fn expire(&self, now: DateTime<Utc>) -> Result<usize, QuotaError> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT DISTINCT id FROM reservations WHERE expires_at < $1")
                .bind(now)
                .fetch_all(&self.pool)
                .await?;

        let mut expired = 0;
        for id in ids {
            if self.settle(id, false).await? {
                expired += 1;
            }
        }
        Ok(expired)
    }
}
