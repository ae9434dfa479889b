//! Shared state for the dashboard server.

use std::sync::Arc;
use std::time::Instant;

use logdash_engine::LogEngine;

use crate::config::DashboardConfig;

/// Shared state for the dashboard server.
#[derive(Debug)]
pub struct DashboardState {
    /// Dashboard configuration.
    config: Arc<DashboardConfig>,
    /// The running log engine.
    engine: Arc<LogEngine>,
    /// Server start time.
    start_time: Instant,
}

impl DashboardState {
    /// Create a new dashboard state.
    pub fn new(config: DashboardConfig, engine: Arc<LogEngine>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            start_time: Instant::now(),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Get the log engine.
    #[must_use]
    pub fn engine(&self) -> &LogEngine {
        &self.engine
    }

    /// Get server uptime in seconds.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
