//! In-memory quota ledger.
//!
//! Each project's usage map lives in one DashMap entry; holding the entry
//! guard makes the check-then-apply of a reservation atomic per project.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{QuotaDeltas, QuotaError, QuotaLedger, QuotaLimits, QuotaUsage, Reservation, check_headroom};
use crate::core_types::ProjectId;

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    in_use: i64,
    reserved: i64,
}

/// Quota ledger kept in process memory
pub struct InMemoryQuotaLedger {
    limits: QuotaLimits,
    usages: DashMap<ProjectId, HashMap<String, Counters>>,
    reservations: DashMap<Uuid, Reservation>,
}

impl InMemoryQuotaLedger {
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            limits,
            usages: DashMap::new(),
            reservations: DashMap::new(),
        }
    }

    /// Number of reservations not yet committed or rolled back
    pub fn outstanding(&self) -> usize {
        self.reservations.len()
    }

    fn settle(&self, reservation: &Reservation, commit: bool) {
        let mut project = self
            .usages
            .entry(reservation.project_id.clone())
            .or_default();

        for (resource, delta) in reservation.deltas.iter() {
            let counters = project.entry(resource.to_string()).or_default();
            if delta >= 0 {
                counters.reserved -= delta;
            }
            if commit {
                counters.in_use += delta;
                if counters.in_use < 0 {
                    warn!(
                        project_id = %reservation.project_id,
                        resource,
                        in_use = counters.in_use,
                        "Negative usage after commit, clamping to zero"
                    );
                    counters.in_use = 0;
                }
            }
        }
    }
}

impl Default for InMemoryQuotaLedger {
    fn default() -> Self {
        Self::new(QuotaLimits::default())
    }
}

#[async_trait]
impl QuotaLedger for InMemoryQuotaLedger {
    async fn reserve(
        &self,
        project_id: &str,
        deltas: &QuotaDeltas,
    ) -> Result<Reservation, QuotaError> {
        let mut project = self.usages.entry(project_id.to_string()).or_default();

        for (resource, delta) in deltas.iter() {
            let counters = project.get(resource).copied().unwrap_or_default();
            let usage = QuotaUsage {
                in_use: counters.in_use,
                reserved: counters.reserved,
                limit: self.limits.limit_for(project_id, resource),
            };
            check_headroom(resource, delta, usage)?;
        }

        for (resource, delta) in deltas.iter() {
            if delta > 0 {
                project.entry(resource.to_string()).or_default().reserved += delta;
            }
        }
        drop(project);

        let reservation = Reservation {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            deltas: deltas.clone(),
            expires_at: Utc::now() + self.limits.reservation_ttl(),
        };
        self.reservations.insert(reservation.id, reservation.clone());

        debug!(
            reservation_id = %reservation.id,
            project_id,
            "Quota reserved"
        );
        Ok(reservation)
    }

    async fn commit(&self, reservation: &Reservation) -> Result<(), QuotaError> {
        let (_, stored) = self
            .reservations
            .remove(&reservation.id)
            .ok_or(QuotaError::UnknownReservation(reservation.id))?;
        self.settle(&stored, true);
        Ok(())
    }

    async fn rollback(&self, reservation: &Reservation) -> Result<(), QuotaError> {
        let (_, stored) = self
            .reservations
            .remove(&reservation.id)
            .ok_or(QuotaError::UnknownReservation(reservation.id))?;
        self.settle(&stored, false);
        Ok(())
    }

    async fn usage(&self, project_id: &str, resource: &str) -> Result<QuotaUsage, QuotaError> {
        let counters = self
            .usages
            .get(project_id)
            .and_then(|project| project.get(resource).copied())
            .unwrap_or_default();
        Ok(QuotaUsage {
            in_use: counters.in_use,
            reserved: counters.reserved,
            limit: self.limits.limit_for(project_id, resource),
        })
    }

    async fn expire(&self, now: DateTime<Utc>) -> Result<usize, QuotaError> {
        let stale: Vec<Uuid> = self
            .reservations
            .iter()
            .filter(|r| r.expires_at < now)
            .map(|r| r.id)
            .collect();

        let mut expired = 0;
        for id in stale {
            // Skip ids committed or rolled back since the scan
            if let Some((_, reservation)) = self.reservations.remove(&id) {
                self.settle(&reservation, false);
                expired += 1;
            }
        }
        Ok(expired)
    }
}
