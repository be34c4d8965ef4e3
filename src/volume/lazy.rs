//! Lazily loaded volume fields.
//!
//! A [`LazyVolume`] carries the base record and fetches the related field
//! groups (`metadata`, `admin_metadata`, `volume_type`) on first access.
//! Each group is loaded at most once; `None` in its slot means "not loaded".

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use super::types::{VolumeRecord, VolumeType};
use crate::context::RequestContext;
use crate::core_types::VolumeId;
use crate::transfer::TransferError;

pub type Metadata = BTreeMap<String, String>;

/// Related field groups that can be loaded on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LazyField {
    Metadata,
    AdminMetadata,
    VolumeType,
}

impl LazyField {
    pub const ALL: [LazyField; 3] = [
        LazyField::Metadata,
        LazyField::AdminMetadata,
        LazyField::VolumeType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LazyField::Metadata => "metadata",
            LazyField::AdminMetadata => "admin_metadata",
            LazyField::VolumeType => "volume_type",
        }
    }
}

impl FromStr for LazyField {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LazyField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| TransferError::NotLazyLoadable(s.to_string()))
    }
}

impl fmt::Display for LazyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source of related volume fields
#[async_trait]
pub trait VolumeFieldLoader: Send + Sync {
    async fn load_metadata(&self, id: VolumeId) -> Result<Metadata, TransferError>;

    async fn load_admin_metadata(&self, id: VolumeId) -> Result<Metadata, TransferError>;

    async fn load_volume_type(&self, type_id: &str) -> Result<Option<VolumeType>, TransferError>;
}

/// Volume record with on-demand related fields
pub struct LazyVolume {
    record: VolumeRecord,
    is_admin: bool,
    loader: Arc<dyn VolumeFieldLoader>,
    metadata: Option<Metadata>,
    admin_metadata: Option<Metadata>,
    volume_type: Option<Option<VolumeType>>,
}

impl LazyVolume {
    pub fn new(ctx: &RequestContext, record: VolumeRecord, loader: Arc<dyn VolumeFieldLoader>) -> Self {
        Self {
            record,
            is_admin: ctx.is_admin,
            loader,
            metadata: None,
            admin_metadata: None,
            volume_type: None,
        }
    }

    pub fn record(&self) -> &VolumeRecord {
        &self.record
    }

    pub fn into_record(self) -> VolumeRecord {
        self.record
    }

    pub fn is_loaded(&self, field: LazyField) -> bool {
        match field {
            LazyField::Metadata => self.metadata.is_some(),
            LazyField::AdminMetadata => self.admin_metadata.is_some(),
            LazyField::VolumeType => self.volume_type.is_some(),
        }
    }

    /// Load a field group by name; unknown names are rejected
    pub async fn load(&mut self, name: &str) -> Result<(), TransferError> {
        match name.parse::<LazyField>()? {
            LazyField::Metadata => self.metadata().await.map(|_| ()),
            LazyField::AdminMetadata => self.admin_metadata().await.map(|_| ()),
            LazyField::VolumeType => self.volume_type().await.map(|_| ()),
        }
    }

    pub async fn metadata(&mut self) -> Result<&Metadata, TransferError> {
        if self.metadata.is_none() {
            self.metadata = Some(self.loader.load_metadata(self.record.id).await?);
        }
        Ok(&*self.metadata.get_or_insert_with(Metadata::new))
    }

    /// Admin metadata; always empty for non-admin callers
    pub async fn admin_metadata(&mut self) -> Result<&Metadata, TransferError> {
        if self.admin_metadata.is_none() {
            let loaded = if self.is_admin {
                self.loader.load_admin_metadata(self.record.id).await?
            } else {
                Metadata::new()
            };
            self.admin_metadata = Some(loaded);
        }
        Ok(&*self.admin_metadata.get_or_insert_with(Metadata::new))
    }

    pub async fn volume_type(&mut self) -> Result<Option<&VolumeType>, TransferError> {
        if self.volume_type.is_none() {
            let loaded = match &self.record.volume_type_id {
                Some(type_id) => self.loader.load_volume_type(type_id).await?,
                None => None,
            };
            self.volume_type = Some(loaded);
        }
        Ok(self.volume_type.as_ref().and_then(|t| t.as_ref()))
    }
}
