//! Dashboard server configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use logdash_engine::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, DashboardResult};

/// Configuration for the dashboard server.
///
/// Every field has a default, so a config file only needs the values it
/// changes:
///
/// ```json
/// { "bind_addr": "127.0.0.1:9000", "engine": { "log_root": "/var/log/apps" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// CORS allowed origins (empty means all).
    pub cors_origins: Vec<String>,
    /// How long a query waits for evicted days to be reloaded, in seconds.
    pub reload_timeout_secs: u64,
    /// Engine settings.
    pub engine: EngineConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            cors_origins: Vec::new(),
            reload_timeout_secs: 10,
            engine: EngineConfig::default(),
        }
    }
}

impl DashboardConfig {
    /// Create a new configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> DashboardResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DashboardError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or the values are rejected.
    pub fn from_json(content: &str) -> DashboardResult<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| DashboardError::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for values the server cannot run with.
    pub fn validate(&self) -> DashboardResult<()> {
        if self.reload_timeout_secs == 0 {
            return Err(DashboardError::Config(
                "reload_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.engine
            .validate()
            .map_err(|e| DashboardError::Config(e.to_string()))
    }

    /// How long a query waits for evicted days to be reloaded.
    #[must_use]
    pub const fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.reload_timeout_secs)
    }

    /// Add a CORS allowed origin.
    #[must_use]
    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origins.push(origin.into());
        self
    }

    /// Set the reload timeout.
    #[must_use]
    pub const fn with_reload_timeout_secs(mut self, secs: u64) -> Self {
        self.reload_timeout_secs = secs;
        self
    }

    /// Set the engine configuration.
    #[must_use]
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}
