//! # logdash-server
//!
//! HTTP backend for the log dashboard, built on axum and the
//! [`logdash_engine`] polling and query engine.
//!
//! ## Example
//!
//! ```rust,no_run
//! use logdash_server::{DashboardConfig, DashboardServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DashboardConfig::from_file("logdash.json")?;
//!     let addr = config.bind_addr;
//!     let server = DashboardServer::start(config)?;
//!     server.serve(addr).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/api/health` | GET | Status, uptime and cache counters |
//! | `/api/projects` | GET | Project names, sorted |
//! | `/api/projects/{project}/dates` | GET | Days with log files for a project |
//! | `/api/logs/query` | POST | Filtered, sorted, paginated records |
//! | `/api/logs/cache/{project}` | GET | Newest records of a project |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use server::DashboardServer;
pub use state::DashboardState;
