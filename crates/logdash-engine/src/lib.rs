//! # logdash-engine
//!
//! Incremental indexing, caching and querying of per-project, date-partitioned
//! log files that keep growing and occasionally rotate.
//!
//! This crate provides:
//!
//! - [`LineParser`]: turns raw lines into records, folding continuation lines
//! - [`FileTracker`]: per-file read offsets and partial-line buffering
//! - [`Poller`] / [`PollerHandle`]: the fixed-interval loop that reads new bytes
//! - [`CacheStore`]: project-day buckets with immutable snapshot reads
//! - [`QueryEngine`]: filtering, deterministic ordering and pagination
//! - [`ProjectRegistry`]: the known projects and their days
//! - [`LogEngine`]: all of the above wired together
//!
//! ## Example
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use logdash_engine::{EngineConfig, LogEngine, LogLevel, LogQuery};
//!
//! # async fn run() -> logdash_engine::Result<()> {
//! let engine = LogEngine::start(EngineConfig::new("/var/log/apps"))?;
//!
//! let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default();
//! let query = LogQuery::new("checkout", day, day)
//!     .with_levels(&[LogLevel::Error])
//!     .with_keyword("timeout")
//!     .with_page(1, 50);
//! let page = engine.query(&query)?;
//! println!("{} matching records", page.total);
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! The log root is expected to look like `<root>/<project>/<YYYY-MM-DD>.log`;
//! see [`PartitionLayout`] for the accepted file names.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod parser;
pub mod poller;
pub mod query;
pub mod registry;
pub mod tracker;
pub mod types;

// Re-export main types
pub use cache::{CacheStore, Snapshot, SnapshotRead};
pub use config::EngineConfig;
pub use engine::{EngineStats, LogEngine};
pub use error::{EngineError, Result};
pub use layout::PartitionLayout;
pub use parser::{LineParser, ParseContext, ParsedLine};
pub use poller::{PollReport, Poller, PollerHandle};
pub use query::{LatestRecords, LogQuery, QueryEngine, QueryPage};
pub use registry::ProjectRegistry;
pub use tracker::{Change, FileState, FileTracker, IngestBatch};
pub use types::{BucketKey, LogLevel, LogRecord, SortOrder};
