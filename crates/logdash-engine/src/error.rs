//! Error types for the log engine.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur in the log engine.
///
/// Only the validation family ever reaches a query caller. Ingestion faults
/// are logged by the poller and retried on the next pass.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested page number is below 1.
    #[error("invalid page: {0} (pages start at 1)")]
    InvalidPage(i64),

    /// The page size is missing or not positive.
    #[error("invalid page size: {0}")]
    InvalidPageSize(String),

    /// The date range starts after it ends.
    #[error("invalid date range: start {start} is after end {end}")]
    InvertedDateRange {
        /// Requested first day.
        start: NaiveDate,
        /// Requested last day.
        end: NaiveDate,
    },

    /// The project is not known to the registry.
    #[error("unknown project: {0}")]
    UnknownProject(String),

    /// A level name in the filter is not recognized.
    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    /// Sorting was requested on a field other than the timestamp.
    #[error("unsupported sort field: {0}")]
    UnsupportedSort(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A query task on the blocking pool failed to complete.
    #[error("query task failed: {0}")]
    Task(String),
}

impl EngineError {
    /// Returns true for errors caused by a malformed request.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidPage(_)
                | Self::InvalidPageSize(_)
                | Self::InvertedDateRange { .. }
                | Self::UnknownProject(_)
                | Self::UnknownLevel(_)
                | Self::UnsupportedSort(_)
        )
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
