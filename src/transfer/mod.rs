//! Volume Ownership Transfer
//!
//! Moves a volume from one project to another through a two-party handshake:
//! the owner creates a transfer and receives a one-time auth key out of band,
//! the recipient accepts with the transfer id plus that key.
//!
//! # Invariants
//!
//! 1. **One live transfer per volume**: enforced by the store
//! 2. **Status CAS is the lock**: every transition is a conditional update on
//!    the volume's status, so concurrent callers race and exactly one wins
//! 3. **Quota before reassignment**: accept reserves in both projects, and only
//!    commits once the volume has moved
//! 4. **Keys are never stored**: only a salted hash is persisted

pub mod auth;
pub mod db;
pub mod error;
pub mod manager;
pub mod types;

#[cfg(test)]
mod integration_tests;

pub use auth::AuthKeyHasher;
pub use db::{PgTransferStore, TransferStore};
pub use error::TransferError;
pub use manager::TransferManager;
pub use types::{AcceptedTransfer, CreatedTransfer, TransferInfo, TransferOp, TransferRecord};
