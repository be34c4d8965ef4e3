//! Volume Transfer - move block-storage volumes between projects
//!
//! A volume owner offers a volume for transfer and receives a one-time auth
//! key. Whoever presents the transfer id and key takes ownership; quota is
//! moved from the old project to the new one in the same step.
//!
//! # Modules
//!
//! - [`core_types`] - Identifier aliases
//! - [`context`] - Authenticated caller context
//! - [`volume`] - Volume records, the store interface and lazy field loading
//! - [`quota`] - Reservation-based quota ledger
//! - [`transfer`] - Transfer records, auth keys and the [`TransferManager`]
//! - [`notify`] - Lifecycle notification sinks
//! - [`memory`] - In-memory store for tests and demos
//! - [`db`] - PostgreSQL pool and schema

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod context;
pub mod db;
pub mod logging;
pub mod memory;
pub mod notify;
pub mod quota;
pub mod transfer;
pub mod volume;

// Convenient re-exports at crate root
pub use context::RequestContext;
pub use core_types::{ProjectId, TransferId, UserId, VolumeId};
pub use memory::MemoryStore;
pub use notify::{NotificationSink, RecordingSink, TracingSink};
pub use quota::{InMemoryQuotaLedger, QuotaDeltas, QuotaLedger, QuotaLimits};
pub use transfer::{AuthKeyHasher, TransferError, TransferManager, TransferStore};
pub use volume::{VolumeRecord, VolumeStatus, VolumeStore};
