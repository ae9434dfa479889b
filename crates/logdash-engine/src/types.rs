//! Core types for parsed log records.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Log severity levels.
///
/// `Unknown` is the sentinel for level tokens the parser does not recognize
/// and for lines that carry no prefix at all. Such records are kept, never
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug-level messages.
    Debug,
    /// Informational messages.
    Info,
    /// Warnings.
    Warning,
    /// Errors.
    Error,
    /// Critical failures.
    Critical,
    /// Unrecognized level token.
    Unknown,
}

impl LogLevel {
    /// All levels, in severity order with `Unknown` last.
    pub const ALL: [Self; 6] = [
        Self::Debug,
        Self::Info,
        Self::Warning,
        Self::Error,
        Self::Critical,
        Self::Unknown,
    ];

    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Matches a level token case-insensitively against the known set.
    ///
    /// Returns `None` for anything else, including `UNKNOWN` itself: a line
    /// that literally says `UNKNOWN` did not name a real level.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" | "WARN" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = EngineError;

    /// Parses a level name from a query filter. Unlike
    /// [`LogLevel::from_token`] this accepts `UNKNOWN`, so callers can ask for
    /// the unparsed records explicitly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("UNKNOWN") {
            return Ok(Self::Unknown);
        }
        Self::from_token(trimmed).ok_or_else(|| EngineError::UnknownLevel(s.to_string()))
    }
}

/// One parsed log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Owning project.
    pub project: String,
    /// Parsed (or inherited) wall-clock time.
    pub timestamp: NaiveDateTime,
    /// Severity.
    pub level: LogLevel,
    /// Message text, continuation lines joined with `\n`.
    pub message: String,
    /// Correlation id written by the logger, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_id: Option<String>,
    /// Thread name written by the logger, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    /// Process name written by the logger, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    /// Path of the file the record was read from.
    pub source_file: String,
    /// Partition day of the source file.
    pub source_day: NaiveDate,
    /// Position of the record within its file.
    pub sequence: u64,
}

impl LogRecord {
    /// Total order used for sorting: timestamp, then file, then sequence.
    ///
    /// `(source_file, sequence)` is unique, so two distinct records never
    /// compare equal.
    #[must_use]
    pub fn chronological_cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.source_file.cmp(&other.source_file))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

/// Identifies one bucket: a project on one partition day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    /// Project name.
    pub project: String,
    /// Partition day.
    pub day: NaiveDate,
}

impl BucketKey {
    /// Creates a bucket key.
    #[must_use]
    pub fn new(project: impl Into<String>, day: NaiveDate) -> Self {
        Self {
            project: project.into(),
            day,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.day)
    }
}

/// Result ordering by timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Oldest first.
    Asc,
    /// Newest first.
    #[default]
    Desc,
}
