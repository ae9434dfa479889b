//! Mapping log file paths to partition days.
//!
//! Loggers write `<project>/<day>.log`, rolling over to `<day>_1.log`,
//! `<day>_2.log` when a file grows too large, and some prefix the day
//! (`log_<day>.log`). The partition day is taken from the first `_`-separated
//! token of the file stem that parses with the configured date format.

use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// How log files are named on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionLayout {
    /// File extension of log files, without the dot.
    pub extension: String,
    /// `chrono` format of the day embedded in the file name.
    pub date_format: String,
    /// Use the modification date when the name carries no day.
    pub mtime_fallback: bool,
}

impl Default for PartitionLayout {
    fn default() -> Self {
        Self {
            extension: "log".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            mtime_fallback: true,
        }
    }
}

impl PartitionLayout {
    /// Returns true if the path has the configured log extension.
    #[must_use]
    pub fn is_log_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    /// Derives the partition day from the file name, or from `modified` when
    /// the name carries none and the fallback is enabled.
    #[must_use]
    pub fn partition_day(&self, path: &Path, modified: Option<SystemTime>) -> Option<NaiveDate> {
        let from_name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| {
                stem.split('_')
                    .find_map(|token| NaiveDate::parse_from_str(token, &self.date_format).ok())
            });

        from_name.or_else(|| {
            if self.mtime_fallback {
                modified.map(|t| DateTime::<Local>::from(t).date_naive())
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use test_case::test_case;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test_case("2024-05-01.log" ; "plain day")]
    #[test_case("2024-05-01_3.log" ; "rolled over")]
    #[test_case("log_2024-05-01.log" ; "prefixed")]
    fn day_from_file_name(name: &str) {
        let layout = PartitionLayout::default();
        let path = PathBuf::from("/logs/alpha").join(name);
        assert_eq!(layout.partition_day(&path, None), Some(day(2024, 5, 1)));
    }

    #[test]
    fn falls_back_to_mtime() {
        let layout = PartitionLayout::default();
        let path = PathBuf::from("/logs/alpha/service.log");
        let now = SystemTime::now();
        assert_eq!(
            layout.partition_day(&path, Some(now)),
            Some(DateTime::<Local>::from(now).date_naive())
        );
    }

    #[test]
    fn no_fallback_ignores_undated_files() {
        let layout = PartitionLayout {
            mtime_fallback: false,
            ..PartitionLayout::default()
        };
        let path = PathBuf::from("/logs/alpha/service.log");
        assert_eq!(layout.partition_day(&path, Some(SystemTime::now())), None);
    }

    #[test]
    fn custom_date_format() {
        let layout = PartitionLayout {
            date_format: "%Y%m%d".to_string(),
            ..PartitionLayout::default()
        };
        let path = PathBuf::from("/logs/alpha/app_20240501.log");
        assert_eq!(layout.partition_day(&path, None), Some(day(2024, 5, 1)));
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let layout = PartitionLayout::default();
        assert!(layout.is_log_file(Path::new("a/2024-05-01.LOG")));
        assert!(!layout.is_log_file(Path::new("a/2024-05-01.log.gz")));
        assert!(!layout.is_log_file(Path::new("a/README")));
    }
}
