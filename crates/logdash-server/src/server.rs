//! Dashboard server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use logdash_engine::LogEngine;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::DashboardConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::routes::create_router;
use crate::state::DashboardState;

/// HTTP backend of the log dashboard.
///
/// Owns the log engine; the polling loop runs for as long as the server does.
#[derive(Debug, Clone)]
pub struct DashboardServer {
    state: Arc<DashboardState>,
}

impl DashboardServer {
    /// Create a server around an already started engine.
    #[must_use]
    pub fn new(config: DashboardConfig, engine: Arc<LogEngine>) -> Self {
        let state = Arc::new(DashboardState::new(config, engine));
        Self { state }
    }

    /// Validate the configuration and start the engine it describes.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn start(config: DashboardConfig) -> DashboardResult<Self> {
        config.validate()?;
        let engine = LogEngine::start(config.engine.clone())?;
        Ok(Self::new(config, Arc::new(engine)))
    }

    /// Get the dashboard state for external access.
    #[must_use]
    pub fn state(&self) -> Arc<DashboardState> {
        self.state.clone()
    }

    /// Start the dashboard server and listen for connections.
    ///
    /// This method runs until the server encounters a fatal error.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn serve(&self, addr: SocketAddr) -> DashboardResult<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DashboardError::BindFailed(addr, e))?;

        info!(addr = %addr, "Dashboard server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| DashboardError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Start the dashboard server with graceful shutdown support.
    ///
    /// The server stops accepting connections when `shutdown` completes and
    /// then stops the engine's polling loop.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn serve_with_shutdown<F>(&self, addr: SocketAddr, shutdown: F) -> DashboardResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DashboardError::BindFailed(addr, e))?;

        info!(addr = %addr, "Dashboard server listening");

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| DashboardError::Internal(e.to_string()));

        self.state.engine().shutdown().await;
        info!("Dashboard server shut down");
        served
    }

    /// Create the router without starting the server.
    ///
    /// Useful for testing or embedding in another server.
    pub fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }
}
