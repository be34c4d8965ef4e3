//! Transfer Core Types

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core_types::{TransferId, VolumeId};

/// Operation a notification belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOp {
    Create,
    Accept,
    Delete,
}

impl TransferOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferOp::Create => "create",
            TransferOp::Accept => "accept",
            TransferOp::Delete => "delete",
        }
    }

    /// `transfer.<op>.start`
    pub fn start_event(&self) -> String {
        format!("transfer.{}.start", self.as_str())
    }

    /// `transfer.<op>.end`
    pub fn end_event(&self) -> String {
        format!("transfer.{}.end", self.as_str())
    }
}

/// Transfer record as persisted.
///
/// Created once by `create`, removed by `accept` or `delete`; never updated.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    pub id: TransferId,
    pub volume_id: VolumeId,
    pub display_name: Option<String>,
    /// Argon2 PHC string of the auth key (salt included)
    pub crypt_hash: String,
    pub created_at: DateTime<Utc>,
}

impl TransferRecord {
    pub fn new(volume_id: VolumeId, display_name: Option<String>, crypt_hash: String) -> Self {
        Self {
            id: TransferId::new_v4(),
            volume_id,
            display_name,
            crypt_hash,
            created_at: Utc::now(),
        }
    }
}

/// Transfer as shown to its owner: everything except the key hash
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferInfo {
    pub id: TransferId,
    pub volume_id: VolumeId,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&TransferRecord> for TransferInfo {
    fn from(record: &TransferRecord) -> Self {
        Self {
            id: record.id,
            volume_id: record.volume_id,
            display_name: record.display_name.clone(),
            created_at: record.created_at,
        }
    }
}

/// Result of `create`. `auth_key` is the only copy of the plaintext key.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedTransfer {
    pub id: TransferId,
    pub volume_id: VolumeId,
    pub display_name: Option<String>,
    pub auth_key: String,
    pub created_at: DateTime<Utc>,
}

/// Result of `accept`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptedTransfer {
    pub id: TransferId,
    pub volume_id: VolumeId,
    pub display_name: Option<String>,
}
