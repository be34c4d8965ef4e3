//! Core types used throughout the system
//!
//! Identifiers are kept as aliases so every module agrees on their shape.

/// Project (tenant) ID - opaque string issued by the identity service.
///
/// # Usage:
/// - Owner of volumes and quota usage
/// - Visibility boundary for `get` / `get_all`
pub type ProjectId = String;

/// User ID - opaque string issued by the identity service.
pub type UserId = String;

/// Volume ID - UUID assigned by the volume subsystem
pub type VolumeId = uuid::Uuid;

/// Transfer ID - random UUID, unrelated to the transfer's auth key
pub type TransferId = uuid::Uuid;

/// Volume type ID
pub type VolumeTypeId = String;

/// Size in GiB
pub type Gigabytes = i64;
