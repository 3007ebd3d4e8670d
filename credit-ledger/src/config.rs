//! Configuration for the credit ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Signup bonus granted on first account creation
    pub signup_bonus: u64,

    /// Credits held per accepted job
    pub job_hold_amount: u64,

    /// Reward granted to an inviter per unique registered invitee
    pub invite_reward: u64,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Reservation sweep configuration
    pub sweep: SweepConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/credit-ledger"),
            service_name: "credit-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            signup_bonus: 1,
            job_hold_amount: 1,
            invite_reward: 1,
            rocksdb: RocksDbConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

/// Reservation sweep configuration
///
/// A HELD reservation whose job has not reported completion within
/// `job_timeout_secs` is released by the background sweep, returning the
/// held credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Enable the background sweep
    pub enabled: bool,

    /// Sweep interval (seconds)
    pub interval_secs: u64,

    /// Job timeout before a HELD reservation is reclaimed (seconds)
    pub job_timeout_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            job_timeout_secs: 900, // longest job class (video) runs ~10 min
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(secs) = std::env::var("LEDGER_JOB_TIMEOUT_SECS") {
            config.sweep.job_timeout_secs = secs
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid LEDGER_JOB_TIMEOUT_SECS: {}", e)))?;
        }

        if let Ok(secs) = std::env::var("LEDGER_SWEEP_INTERVAL_SECS") {
            config.sweep.interval_secs = secs
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid LEDGER_SWEEP_INTERVAL_SECS: {}", e)))?;
        }

        Ok(config)
    }
}
