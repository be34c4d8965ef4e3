//! Volume store interface

use async_trait::async_trait;

use super::types::{VolumeRecord, VolumeStatus, VolumeUpdate};
use crate::core_types::VolumeId;
use crate::transfer::TransferError;

/// Persistence for volume records.
///
/// `conditional_update` is the mutual-exclusion point of every transfer
/// operation: it must apply the update only when the stored status equals
/// `expected`, atomically with respect to other callers.
#[async_trait]
pub trait VolumeStore: Send + Sync {
    /// Insert a new volume record
    async fn create(&self, volume: &VolumeRecord) -> Result<(), TransferError>;

    /// Get a volume by ID, regardless of owner
    async fn get(&self, id: VolumeId) -> Result<Option<VolumeRecord>, TransferError>;

    /// All volumes owned by a project
    async fn list_by_project(&self, project_id: &str) -> Result<Vec<VolumeRecord>, TransferError>;

    /// Atomic CAS update on status.
    ///
    /// Returns true if the update was applied, false if the volume is missing
    /// or its status did not match `expected`.
    async fn conditional_update(
        &self,
        id: VolumeId,
        expected: &VolumeStatus,
        update: &VolumeUpdate,
    ) -> Result<bool, TransferError>;

    /// Remove a volume. Any live transfer of the volume is removed with it.
    ///
    /// Returns false if the volume did not exist.
    async fn destroy(&self, id: VolumeId) -> Result<bool, TransferError>;
}
