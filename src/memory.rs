//! In-memory store
//!
//! Volumes, their related fields and transfers share one lock, so the
//! status CAS, the one-transfer-per-volume check and the cascade on
//! `destroy` are each a single critical section.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::core_types::{TransferId, VolumeId, VolumeTypeId};
use crate::transfer::{TransferError, TransferRecord, TransferStore};
use crate::volume::{
    Metadata, VolumeFieldLoader, VolumeRecord, VolumeStatus, VolumeStore, VolumeType, VolumeUpdate,
};

#[derive(Default)]
struct Tables {
    volumes: HashMap<VolumeId, VolumeRecord>,
    metadata: HashMap<VolumeId, Metadata>,
    admin_metadata: HashMap<VolumeId, Metadata>,
    volume_types: HashMap<VolumeTypeId, VolumeType>,
    transfers: HashMap<TransferId, TransferRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, TransferError> {
        self.tables
            .lock()
            .map_err(|_| TransferError::SystemError("memory store lock poisoned".to_string()))
    }

    pub fn add_volume_type(&self, volume_type: VolumeType) -> Result<(), TransferError> {
        self.tables()?
            .volume_types
            .insert(volume_type.id.clone(), volume_type);
        Ok(())
    }

    pub fn set_metadata(&self, id: VolumeId, metadata: Metadata) -> Result<(), TransferError> {
        self.tables()?.metadata.insert(id, metadata);
        Ok(())
    }

    pub fn set_admin_metadata(&self, id: VolumeId, metadata: Metadata) -> Result<(), TransferError> {
        self.tables()?.admin_metadata.insert(id, metadata);
        Ok(())
    }

    /// Overwrite a volume's status unconditionally, as the volume subsystem
    /// does outside of transfers
    pub fn force_status(&self, id: VolumeId, status: VolumeStatus) -> Result<bool, TransferError> {
        let mut tables = self.tables()?;
        match tables.volumes.get_mut(&id) {
            Some(volume) => {
                VolumeUpdate::status(status).apply(volume);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn transfer_count(&self) -> usize {
        self.tables().map(|t| t.transfers.len()).unwrap_or(0)
    }
}

#[async_trait]
impl VolumeStore for MemoryStore {
    async fn create(&self, volume: &VolumeRecord) -> Result<(), TransferError> {
        let mut tables = self.tables()?;
        if tables.volumes.contains_key(&volume.id) {
            return Err(TransferError::DatabaseError(format!(
                "duplicate volume id {}",
                volume.id
            )));
        }
        tables.volumes.insert(volume.id, volume.clone());
        Ok(())
    }

    async fn get(&self, id: VolumeId) -> Result<Option<VolumeRecord>, TransferError> {
        Ok(self.tables()?.volumes.get(&id).cloned())
    }

    async fn list_by_project(&self, project_id: &str) -> Result<Vec<VolumeRecord>, TransferError> {
        let tables = self.tables()?;
        let mut volumes: Vec<VolumeRecord> = tables
            .volumes
            .values()
            .filter(|v| v.project_id == project_id)
            .cloned()
            .collect();
        volumes.sort_by_key(|v| v.created_at);
        Ok(volumes)
    }

    async fn conditional_update(
        &self,
        id: VolumeId,
        expected: &VolumeStatus,
        update: &VolumeUpdate,
    ) -> Result<bool, TransferError> {
        let mut tables = self.tables()?;
        match tables.volumes.get_mut(&id) {
            Some(volume) if &volume.status == expected => {
                update.apply(volume);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn destroy(&self, id: VolumeId) -> Result<bool, TransferError> {
        let mut tables = self.tables()?;
        if tables.volumes.remove(&id).is_none() {
            return Ok(false);
        }
        tables.metadata.remove(&id);
        tables.admin_metadata.remove(&id);
        tables.transfers.retain(|_, t| t.volume_id != id);
        Ok(true)
    }
}

#[async_trait]
impl TransferStore for MemoryStore {
    async fn create(&self, record: &TransferRecord) -> Result<(), TransferError> {
        let mut tables = self.tables()?;
        if !tables.volumes.contains_key(&record.volume_id) {
            return Err(TransferError::VolumeNotFound(record.volume_id.to_string()));
        }
        if tables
            .transfers
            .values()
            .any(|t| t.volume_id == record.volume_id)
        {
            return Err(TransferError::InvalidVolume(format!(
                "volume {} already has a pending transfer",
                record.volume_id
            )));
        }
        tables.transfers.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: TransferId) -> Result<Option<TransferRecord>, TransferError> {
        Ok(self.tables()?.transfers.get(&id).cloned())
    }

    async fn list(&self, project_id: Option<&str>) -> Result<Vec<TransferRecord>, TransferError> {
        let tables = self.tables()?;
        let mut records: Vec<TransferRecord> = tables
            .transfers
            .values()
            .filter(|t| match project_id {
                Some(project_id) => tables
                    .volumes
                    .get(&t.volume_id)
                    .is_some_and(|v| v.project_id == project_id),
                None => true,
            })
            .cloned()
            .collect();
        records.sort_by_key(|t| t.created_at);
        Ok(records)
    }

    async fn delete(&self, id: TransferId) -> Result<bool, TransferError> {
        Ok(self.tables()?.transfers.remove(&id).is_some())
    }
}

#[async_trait]
impl VolumeFieldLoader for MemoryStore {
    async fn load_metadata(&self, id: VolumeId) -> Result<Metadata, TransferError> {
        Ok(self.tables()?.metadata.get(&id).cloned().unwrap_or_default())
    }

    async fn load_admin_metadata(&self, id: VolumeId) -> Result<Metadata, TransferError> {
        Ok(self
            .tables()?
            .admin_metadata
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_volume_type(&self, type_id: &str) -> Result<Option<VolumeType>, TransferError> {
        Ok(self.tables()?.volume_types.get(type_id).cloned())
    }
}
