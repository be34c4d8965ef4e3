//! Volumes
//!
//! The slice of the volume model the transfer core needs: records with a
//! status and tenancy, a store with CAS updates, and lazy related fields.

pub mod db;
pub mod lazy;
pub mod store;
pub mod types;

pub use db::PgVolumeStore;
pub use lazy::{LazyField, LazyVolume, Metadata, VolumeFieldLoader};
pub use store::VolumeStore;
pub use types::{VolumeRecord, VolumeStatus, VolumeType, VolumeUpdate};
