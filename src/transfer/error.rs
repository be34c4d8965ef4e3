//! Transfer Error Types
//!
//! Every transfer operation and every store behind it reports failures
//! through [`TransferError`]. The first four variants are user-facing and
//! returned verbatim; nothing in this crate retries them.

use thiserror::Error;

use crate::quota::QuotaError;

/// Transfer error types
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    // === User-facing ===
    #[error("Transfer {0} could not be found")]
    TransferNotFound(String),

    #[error("Invalid auth key")]
    InvalidAuthKey,

    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    #[error("Volume {0} could not be found")]
    VolumeNotFound(String),

    // === Quota ===
    #[error(transparent)]
    QuotaExceeded(QuotaError),

    // === Object loading ===
    #[error("Attribute {0} is not lazy-loadable")]
    NotLazyLoadable(String),

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            TransferError::InvalidAuthKey => "INVALID_AUTH_KEY",
            TransferError::InvalidVolume(_) => "INVALID_VOLUME",
            TransferError::VolumeNotFound(_) => "VOLUME_NOT_FOUND",
            TransferError::QuotaExceeded(e) => e.code(),
            TransferError::NotLazyLoadable(_) => "NOT_LAZY_LOADABLE",
            TransferError::DatabaseError(_) => "DATABASE_ERROR",
            TransferError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidAuthKey | TransferError::InvalidVolume(_) => 400,
            TransferError::TransferNotFound(_) | TransferError::VolumeNotFound(_) => 404,
            TransferError::QuotaExceeded(_) => 413,
            TransferError::NotLazyLoadable(_)
            | TransferError::DatabaseError(_)
            | TransferError::SystemError(_) => 500,
        }
    }

    /// User-facing errors are caused by the request, not by the system
    pub fn is_user_error(&self) -> bool {
        self.http_status() < 500
    }
}

impl From<QuotaError> for TransferError {
    fn from(e: QuotaError) -> Self {
        match e {
            QuotaError::Database(msg) => TransferError::DatabaseError(msg),
            QuotaError::UnknownReservation(id) => {
                TransferError::SystemError(format!("reservation {} not found", id))
            }
            over @ QuotaError::OverQuota { .. } => TransferError::QuotaExceeded(over),
        }
    }
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        TransferError::DatabaseError(e.to_string())
    }
}

impl From<anyhow::Error> for TransferError {
    fn from(e: anyhow::Error) -> Self {
        TransferError::SystemError(e.to_string())
    }
}
