//! Quota Ledger
//!
//! Per-project resource accounting with reserve / commit / rollback.
//!
//! # Lifecycle
//!
//! ```text
//! reserve(+d) ──▶ reserved += d ──commit──▶ in_use += d, reserved -= d
//!                              └─rollback─▶ reserved -= d
//! ```
//!
//! Negative deltas (releases) are never checked against limits. Positive
//! deltas fail with [`QuotaError::OverQuota`] when `in_use + reserved + d`
//! would exceed the project's limit for that resource. A limit of `-1`
//! means unlimited; resources without a configured limit are unlimited.

pub mod db;
pub mod error;
pub mod memory;
pub mod reaper;

pub use db::PgQuotaLedger;
pub use error::QuotaError;
pub use memory::InMemoryQuotaLedger;
pub use reaper::{ReaperConfig, ReservationReaper};

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core_types::{Gigabytes, ProjectId};

/// Volume count resource
pub const VOLUMES: &str = "volumes";
/// Storage size resource (GiB)
pub const GIGABYTES: &str = "gigabytes";

/// Resource name -> signed delta
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDeltas(BTreeMap<String, i64>);

impl QuotaDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deltas for one volume of `size` GiB.
    ///
    /// When the volume has a type, the type-specific `volumes_<type>` and
    /// `gigabytes_<type>` resources are charged as well.
    pub fn for_volume(size: Gigabytes, volume_type_name: Option<&str>) -> Self {
        let mut deltas = Self::new();
        deltas.add(VOLUMES, 1);
        deltas.add(GIGABYTES, size);
        if let Some(name) = volume_type_name {
            deltas.add(&format!("{}_{}", VOLUMES, name), 1);
            deltas.add(&format!("{}_{}", GIGABYTES, name), size);
        }
        deltas
    }

    pub fn add(&mut self, resource: &str, delta: i64) {
        *self.0.entry(resource.to_string()).or_insert(0) += delta;
    }

    /// Same resources with every delta sign-flipped
    pub fn negated(&self) -> Self {
        Self(self.0.iter().map(|(k, v)| (k.clone(), -v)).collect())
    }

    pub fn get(&self, resource: &str) -> i64 {
        self.0.get(resource).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, i64)> for QuotaDeltas {
    fn from_iter<I: IntoIterator<Item = (S, i64)>>(iter: I) -> Self {
        let mut deltas = Self::new();
        for (resource, delta) in iter {
            deltas.add(&resource.into(), delta);
        }
        deltas
    }
}

/// Outstanding hold against a project's quota
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub id: Uuid,
    pub project_id: ProjectId,
    pub deltas: QuotaDeltas,
    pub expires_at: DateTime<Utc>,
}

/// Current accounting for one resource of one project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub in_use: i64,
    pub reserved: i64,
    /// `-1` when unlimited
    pub limit: i64,
}

/// Configured limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaLimits {
    /// Limits applied to every project
    #[serde(default = "default_limits")]
    pub default_limits: HashMap<String, i64>,
    /// Per-project overrides, merged over the defaults
    #[serde(default)]
    pub project_limits: HashMap<ProjectId, HashMap<String, i64>>,
    /// Seconds before an uncommitted reservation may be expired
    #[serde(default = "default_reservation_expire")]
    pub reservation_expire_secs: u64,
}

fn default_limits() -> HashMap<String, i64> {
    HashMap::from([(VOLUMES.to_string(), 10), (GIGABYTES.to_string(), 1000)])
}

fn default_reservation_expire() -> u64 {
    86_400
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            default_limits: default_limits(),
            project_limits: HashMap::new(),
            reservation_expire_secs: default_reservation_expire(),
        }
    }
}

impl QuotaLimits {
    /// Effective limit of `resource` for `project_id` (`-1` = unlimited)
    pub fn limit_for(&self, project_id: &str, resource: &str) -> i64 {
        self.project_limits
            .get(project_id)
            .and_then(|limits| limits.get(resource))
            .or_else(|| self.default_limits.get(resource))
            .copied()
            .unwrap_or(-1)
    }

    pub fn reservation_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reservation_expire_secs as i64)
    }
}

/// Check one positive delta against the current usage and limit
pub(crate) fn check_headroom(
    resource: &str,
    delta: i64,
    usage: QuotaUsage,
) -> Result<(), QuotaError> {
    if delta <= 0 || usage.limit < 0 {
        return Ok(());
    }
    if usage.in_use + usage.reserved + delta > usage.limit {
        return Err(QuotaError::OverQuota {
            resource: resource.to_string(),
            requested: delta,
            in_use: usage.in_use,
            reserved: usage.reserved,
            limit: usage.limit,
        });
    }
    Ok(())
}

/// Quota ledger shared by every request of the host process
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Hold `deltas` against `project_id`; positive deltas are limit-checked.
    ///
    /// Either every resource is reserved or none is.
    async fn reserve(
        &self,
        project_id: &str,
        deltas: &QuotaDeltas,
    ) -> Result<Reservation, QuotaError>;

    /// Move a reservation into `in_use`
    async fn commit(&self, reservation: &Reservation) -> Result<(), QuotaError>;

    /// Drop a reservation without touching `in_use`
    async fn rollback(&self, reservation: &Reservation) -> Result<(), QuotaError>;

    /// Accounting for one resource
    async fn usage(&self, project_id: &str, resource: &str) -> Result<QuotaUsage, QuotaError>;

    /// Roll back every reservation that expired before `now`; returns how many
    async fn expire(&self, now: DateTime<Utc>) -> Result<usize, QuotaError>;

    /// Release `deltas` (given as positive amounts) from `project_id` immediately
    async fn commit_release(&self, project_id: &str, deltas: &QuotaDeltas) -> Result<(), QuotaError> {
        let reservation = self.reserve(project_id, &deltas.negated()).await?;
        self.commit(&reservation).await
    }
}
