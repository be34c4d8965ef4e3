use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::quota::QuotaLimits;
use crate::transfer::auth::MIN_KEY_LENGTH;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub quota: QuotaLimits,
    /// Background expiry of abandoned quota reservations
    #[serde(default)]
    pub reaper: ReaperSettings,
    /// PostgreSQL connection URL; required by every CLI subcommand except `demo`
    #[serde(default)]
    pub postgres_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransferConfig {
    /// Length of generated auth keys
    pub key_length: usize,
    /// Argon2id memory cost in KiB
    pub hash_memory_kib: u32,
    /// Argon2id iteration count
    pub hash_iterations: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            key_length: 16,
            hash_memory_kib: 19 * 1024,
            hash_iterations: 2,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReaperSettings {
    pub scan_interval_secs: u64,
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 60,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config: {}", config_path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Failed to parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    /// Connection URL, or an error naming the config file it is missing from
    pub fn require_postgres_url(&self, env: &str) -> Result<&str> {
        self.postgres_url
            .as_deref()
            .ok_or_else(|| anyhow!("postgres_url is not set in config/{}.yaml", env))
    }

    fn validate(&self) -> Result<()> {
        if self.transfer.key_length < MIN_KEY_LENGTH {
            bail!(
                "transfer.key_length must be at least {}, got {}",
                MIN_KEY_LENGTH,
                self.transfer.key_length
            );
        }
        if self.quota.reservation_expire_secs == 0 {
            bail!("quota.reservation_expire_secs must be positive");
        }
        if self.reaper.scan_interval_secs == 0 {
            bail!("reaper.scan_interval_secs must be positive");
        }
        Ok(())
    }
}
