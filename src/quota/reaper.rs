//! Reservation Reaper
//!
//! Background worker that rolls back reservations left behind by a process
//! that died between `reserve` and `commit`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use super::{QuotaError, QuotaLedger};

/// Configuration for the reservation reaper
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How often to scan for expired reservations
    pub scan_interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(60),
        }
    }
}

pub struct ReservationReaper {
    ledger: Arc<dyn QuotaLedger>,
    config: ReaperConfig,
}

impl ReservationReaper {
    pub fn new(ledger: Arc<dyn QuotaLedger>, config: ReaperConfig) -> Self {
        Self { ledger, config }
    }

    pub fn with_defaults(ledger: Arc<dyn QuotaLedger>) -> Self {
        Self::new(ledger, ReaperConfig::default())
    }

    /// Run the reaper loop forever
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            "Starting reservation reaper"
        );

        loop {
            if let Err(e) = self.scan_once().await {
                error!(error = %e, "Reservation expiry scan failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single expiry pass
    pub async fn scan_once(&self) -> Result<usize, QuotaError> {
        let expired = self.ledger.expire(Utc::now()).await?;
        if expired > 0 {
            info!(count = expired, "Expired stale quota reservations");
        } else {
            debug!("No expired reservations");
        }
        Ok(expired)
    }
}
