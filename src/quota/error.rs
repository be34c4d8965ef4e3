use thiserror::Error;

use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuotaError {
    #[error(
        "Requested {resource} ({requested}) exceeds quota: {in_use} in use, {reserved} reserved, limit {limit}"
    )]
    OverQuota {
        resource: String,
        requested: i64,
        in_use: i64,
        reserved: i64,
        limit: i64,
    },

    #[error("Reservation not found: {0}")]
    UnknownReservation(Uuid),

    #[error("Quota database error: {0}")]
    Database(String),
}

impl QuotaError {
    /// API error code; size overruns are reported separately from count overruns
    pub fn code(&self) -> &'static str {
        match self {
            QuotaError::OverQuota { resource, .. } if resource.starts_with("gigabytes") => {
                "VOLUME_SIZE_EXCEEDS_AVAILABLE_QUOTA"
            }
            QuotaError::OverQuota { .. } => "VOLUME_LIMIT_EXCEEDED",
            QuotaError::UnknownReservation(_) => "UNKNOWN_RESERVATION",
            QuotaError::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl From<sqlx::Error> for QuotaError {
    fn from(e: sqlx::Error) -> Self {
        QuotaError::Database(e.to_string())
    }
}
