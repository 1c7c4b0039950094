//! Store configuration
//!
//! `TallyConfig` can be built with chained setters or loaded from TOML:
//!
//! ```ignore
//! batch_size = 512
//! capacity = 131072
//! block_size = 8192
//! flush_interval_ms = 250
//! store_location = "/var/lib/tally/decisions.db"
//! recovery_mode = "strict"
//! ```
//!
//! Omitted keys take their defaults.

use crate::error::{TallyError, TallyResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default decisions per flush batch and per recovery page
pub const DEFAULT_BATCH_SIZE: usize = 256;
/// Default number of references
pub const DEFAULT_CAPACITY: u64 = 65_536;
/// Default references per block
pub const DEFAULT_BLOCK_SIZE: u64 = 4_096;
/// Default flush period
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1_000;

/// How startup replay treats a decision that cannot be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    /// Log, record in the recovery report, continue with the next decision
    #[default]
    Lenient,
    /// Abort startup with `RecoveryReplayFailure`
    Strict,
}

/// Configuration for one store instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// Decisions per flush batch and per recovery page
    pub batch_size: usize,
    /// Total number of references
    pub capacity: u64,
    /// References per block; the last block absorbs the remainder
    pub block_size: u64,
    /// Flush scheduler period in milliseconds
    pub flush_interval_ms: u64,
    /// SQLite file holding the decision log; `None` keeps it in memory
    pub store_location: Option<PathBuf>,
    /// Replay policy
    pub recovery_mode: RecoveryMode,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            capacity: DEFAULT_CAPACITY,
            block_size: DEFAULT_BLOCK_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            store_location: None,
            recovery_mode: RecoveryMode::Lenient,
        }
    }
}

impl TallyConfig {
    /// Default configuration with an in-memory decision log
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML document and validate
    pub fn from_toml_str(text: &str) -> TallyResult<Self> {
        let config: TallyConfig = toml::from_str(text)
            .map_err(|e| TallyError::invalid_input(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file and validate
    pub fn load(path: impl AsRef<Path>) -> TallyResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TallyError::invalid_input(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Set the batch size
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set total reference capacity
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set references per block
    pub fn block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the flush period
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Persist the decision log to a SQLite file
    pub fn store_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_location = Some(path.into());
        self
    }

    /// Set the replay policy
    pub fn recovery_mode(mut self, mode: RecoveryMode) -> Self {
        self.recovery_mode = mode;
        self
    }

    /// Flush period as a `Duration`
    pub fn flush_interval_duration(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Number of blocks the capacity is partitioned into
    pub fn block_count(&self) -> u64 {
        if self.block_size == 0 {
            return 0;
        }
        (self.capacity / self.block_size).max(1)
    }

    /// Reject configurations the store cannot run with
    pub fn validate(&self) -> TallyResult<()> {
        if self.batch_size == 0 {
            return Err(TallyError::invalid_input("batch_size must be at least 1"));
        }
        if self.block_size == 0 {
            return Err(TallyError::invalid_input("block_size must be at least 1"));
        }
        if self.capacity < self.block_size {
            return Err(TallyError::invalid_input(format!(
                "capacity {} is smaller than one block of {}",
                self.capacity, self.block_size
            )));
        }
        if self.capacity > usize::MAX as u64 {
            return Err(TallyError::invalid_input("capacity does not fit in memory"));
        }
        if self.flush_interval_ms == 0 {
            return Err(TallyError::invalid_input(
                "flush_interval_ms must be at least 1",
            ));
        }
        Ok(())
    }
}
