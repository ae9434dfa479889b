//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::layout::PartitionLayout;

/// Configuration for the polling, caching and parsing layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory holding one sub-directory per project.
    pub log_root: PathBuf,
    /// Seconds between two polling passes.
    pub poll_interval_secs: u64,
    /// Maximum bytes read from one file in one pass.
    pub max_read_bytes: u64,
    /// Record budget of the cache before cold buckets are evicted.
    pub max_cached_records: usize,
    /// Seconds records of a vanished file stay in memory before purge.
    pub stale_grace_secs: u64,
    /// Number of records served by the latest-records view.
    pub latest_limit: usize,
    /// Accepted `chrono` timestamp formats, tried in order.
    pub timestamp_formats: Vec<String>,
    /// File naming convention.
    pub layout: PartitionLayout,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_root: PathBuf::from("logs"),
            poll_interval_secs: 5,
            max_read_bytes: 8 * 1024 * 1024, // 8 MiB
            max_cached_records: 2_000_000,
            stale_grace_secs: 60,
            latest_limit: 100,
            timestamp_formats: vec![
                "%Y-%m-%d %H:%M:%S%.f".to_string(),
                "%Y-%m-%dT%H:%M:%S%.f".to_string(),
            ],
            layout: PartitionLayout::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a config for the given log root.
    #[must_use]
    pub fn new(log_root: impl Into<PathBuf>) -> Self {
        Self {
            log_root: log_root.into(),
            ..Self::default()
        }
    }

    /// Sets the polling interval in seconds.
    #[must_use]
    pub const fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Sets the per-pass read limit.
    #[must_use]
    pub const fn with_max_read_bytes(mut self, bytes: u64) -> Self {
        self.max_read_bytes = bytes;
        self
    }

    /// Sets the cache record budget.
    #[must_use]
    pub const fn with_max_cached_records(mut self, records: usize) -> Self {
        self.max_cached_records = records;
        self
    }

    /// Sets the stale grace period in seconds.
    #[must_use]
    pub const fn with_stale_grace_secs(mut self, secs: u64) -> Self {
        self.stale_grace_secs = secs;
        self
    }

    /// Sets the size of the latest-records view.
    #[must_use]
    pub const fn with_latest_limit(mut self, limit: usize) -> Self {
        self.latest_limit = limit;
        self
    }

    /// Sets the file naming convention.
    #[must_use]
    pub fn with_layout(mut self, layout: PartitionLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Interval between polling passes.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Grace period for records of vanished files.
    #[must_use]
    pub const fn stale_grace(&self) -> Duration {
        Duration::from_secs(self.stale_grace_secs)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.log_root.as_os_str().is_empty() {
            return Err(EngineError::Config("log_root cannot be empty".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(EngineError::Config(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.max_read_bytes == 0 {
            return Err(EngineError::Config(
                "max_read_bytes must be positive".to_string(),
            ));
        }
        if self.max_cached_records == 0 {
            return Err(EngineError::Config(
                "max_cached_records must be positive".to_string(),
            ));
        }
        if self.timestamp_formats.is_empty() {
            return Err(EngineError::Config(
                "at least one timestamp format is required".to_string(),
            ));
        }
        if self.layout.extension.is_empty() {
            return Err(EngineError::Config(
                "layout.extension cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
