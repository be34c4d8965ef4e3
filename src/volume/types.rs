//! Volume Types
//!
//! Volume records as seen by the transfer core. The volume subsystem owns
//! them; transfers only touch `status`, `project_id` and `user_id`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core_types::{Gigabytes, ProjectId, UserId, VolumeId, VolumeTypeId};

/// Volume lifecycle status
///
/// Stored as the lowercase wire string. Statuses written by other parts of
/// the volume subsystem that the transfer core does not know about are kept
/// verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VolumeStatus {
    Creating,
    Available,
    InUse,
    Attaching,
    Detaching,
    /// A transfer has been created and not yet accepted or cancelled
    AwaitingTransfer,
    Deleting,
    Error,
    ErrorDeleting,
    Other(String),
}

impl VolumeStatus {
    pub fn as_str(&self) -> &str {
        match self {
            VolumeStatus::Creating => "creating",
            VolumeStatus::Available => "available",
            VolumeStatus::InUse => "in-use",
            VolumeStatus::Attaching => "attaching",
            VolumeStatus::Detaching => "detaching",
            VolumeStatus::AwaitingTransfer => "awaiting-transfer",
            VolumeStatus::Deleting => "deleting",
            VolumeStatus::Error => "error",
            VolumeStatus::ErrorDeleting => "error_deleting",
            VolumeStatus::Other(s) => s.as_str(),
        }
    }
}

impl From<&str> for VolumeStatus {
    fn from(s: &str) -> Self {
        match s {
            "creating" => VolumeStatus::Creating,
            "available" => VolumeStatus::Available,
            "in-use" => VolumeStatus::InUse,
            "attaching" => VolumeStatus::Attaching,
            "detaching" => VolumeStatus::Detaching,
            "awaiting-transfer" => VolumeStatus::AwaitingTransfer,
            "deleting" => VolumeStatus::Deleting,
            "error" => VolumeStatus::Error,
            "error_deleting" => VolumeStatus::ErrorDeleting,
            other => VolumeStatus::Other(other.to_string()),
        }
    }
}

impl FromStr for VolumeStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(VolumeStatus::from(s))
    }
}

impl fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for VolumeStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for VolumeStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(VolumeStatus::from(s.as_str()))
    }
}

/// Volume record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub id: VolumeId,
    pub status: VolumeStatus,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub volume_type_id: Option<VolumeTypeId>,
    /// Size in GiB
    pub size: Gigabytes,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VolumeRecord {
    /// New `available` volume owned by the given project/user
    pub fn new(project_id: impl Into<ProjectId>, user_id: impl Into<UserId>, size: Gigabytes) -> Self {
        let now = Utc::now();
        Self {
            id: VolumeId::new_v4(),
            status: VolumeStatus::Available,
            project_id: project_id.into(),
            user_id: user_id.into(),
            volume_type_id: None,
            size,
            display_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: VolumeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_volume_type(mut self, volume_type_id: impl Into<VolumeTypeId>) -> Self {
        self.volume_type_id = Some(volume_type_id.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Field changes applied by `VolumeStore::conditional_update`
///
/// `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeUpdate {
    pub status: Option<VolumeStatus>,
    pub project_id: Option<ProjectId>,
    pub user_id: Option<UserId>,
}

impl VolumeUpdate {
    pub fn status(status: VolumeStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Reassign ownership and set status in one update
    pub fn reassign(status: VolumeStatus, project_id: ProjectId, user_id: UserId) -> Self {
        Self {
            status: Some(status),
            project_id: Some(project_id),
            user_id: Some(user_id),
        }
    }

    /// Apply to a record in place, bumping `updated_at`
    pub fn apply(&self, record: &mut VolumeRecord) {
        if let Some(status) = &self.status {
            record.status = status.clone();
        }
        if let Some(project_id) = &self.project_id {
            record.project_id = project_id.clone();
        }
        if let Some(user_id) = &self.user_id {
            record.user_id = user_id.clone();
        }
        record.updated_at = Utc::now();
    }
}

/// Volume type with its extra specs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeType {
    pub id: VolumeTypeId,
    pub name: String,
    #[serde(default)]
    pub extra_specs: BTreeMap<String, String>,
}
