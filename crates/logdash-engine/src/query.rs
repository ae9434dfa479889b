//! Filtering, ordering and pagination over bucket snapshots.
//!
//! A query never touches the filesystem. It snapshots the buckets covering
//! the requested days, so it sees every bucket as it stood at one point in
//! time regardless of what the poller does meanwhile.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::cache::{CacheStore, Snapshot, SnapshotRead};
use crate::error::{EngineError, Result};
use crate::registry::ProjectRegistry;
use crate::types::{LogLevel, LogRecord, SortOrder};

/// The only supported sort field.
pub const SORT_BY_TIMESTAMP: &str = "timestamp";

/// A log query as received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    /// Project name, matched exactly.
    pub project: String,
    /// First day, inclusive.
    pub start_date: NaiveDate,
    /// Last day, inclusive.
    pub end_date: NaiveDate,
    /// Explicit days to keep within the range; absent or empty keeps all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dates: Option<Vec<NaiveDate>>,
    /// Level names to keep; empty keeps all.
    #[serde(default, alias = "level", deserialize_with = "one_or_many")]
    pub levels: Vec<String>,
    /// Case-insensitive substring matched against messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    /// Page number, starting at 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    /// Records per page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i64>,
    /// Sort field.
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    /// Sort direction.
    #[serde(default)]
    pub order: SortOrder,
}

fn default_sort_by() -> String {
    SORT_BY_TIMESTAMP.to_string()
}

/// Accepts either a single string or a list of strings.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(level)) if level.trim().is_empty() => Vec::new(),
        Some(OneOrMany::One(level)) => vec![level],
        Some(OneOrMany::Many(levels)) => levels,
    })
}

impl LogQuery {
    /// Creates a query over a date range with the default page and order.
    #[must_use]
    pub fn new(project: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            project: project.into(),
            start_date,
            end_date,
            dates: None,
            levels: Vec::new(),
            keyword: None,
            page: None,
            page_size: None,
            sort_by: default_sort_by(),
            order: SortOrder::default(),
        }
    }

    /// Restricts the query to the given days of its range.
    #[must_use]
    pub fn with_dates(mut self, dates: &[NaiveDate]) -> Self {
        self.dates = Some(dates.to_vec());
        self
    }

    /// Restricts the query to the given levels.
    #[must_use]
    pub fn with_levels(mut self, levels: &[LogLevel]) -> Self {
        self.levels = levels.iter().map(|l| l.as_str().to_string()).collect();
        self
    }

    /// Sets the keyword filter.
    #[must_use]
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// Sets page and page size.
    #[must_use]
    pub const fn with_page(mut self, page: i64, page_size: i64) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub const fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Checks the query and resolves it into a plan.
    ///
    /// The project is not checked here; that needs the registry.
    pub fn validate(&self) -> Result<QueryPlan> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(EngineError::InvalidPage(page));
        }
        let page_size = match self.page_size {
            None => return Err(EngineError::InvalidPageSize("missing".to_string())),
            Some(size) if size <= 0 => {
                return Err(EngineError::InvalidPageSize(size.to_string()));
            }
            Some(size) => size,
        };
        if self.start_date > self.end_date {
            return Err(EngineError::InvertedDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if !self.sort_by.eq_ignore_ascii_case(SORT_BY_TIMESTAMP) {
            return Err(EngineError::UnsupportedSort(self.sort_by.clone()));
        }

        let mut levels = Vec::with_capacity(self.levels.len());
        for name in &self.levels {
            let level: LogLevel = name.parse()?;
            if !levels.contains(&level) {
                levels.push(level);
            }
        }

        let keyword = self
            .keyword
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase);

        let days = self
            .dates
            .as_ref()
            .filter(|dates| !dates.is_empty())
            .map(|dates| dates.iter().copied().collect());

        Ok(QueryPlan {
            start: self.start_date,
            end: self.end_date,
            days,
            levels,
            keyword,
            page,
            page_size,
            order: self.order,
        })
    }
}

/// A validated query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    start: NaiveDate,
    end: NaiveDate,
    days: Option<BTreeSet<NaiveDate>>,
    levels: Vec<LogLevel>,
    keyword: Option<String>,
    page: i64,
    page_size: i64,
    order: SortOrder,
}

impl QueryPlan {
    /// Returns true if the day's bucket takes part in the query.
    #[must_use]
    pub fn covers(&self, day: NaiveDate) -> bool {
        day >= self.start
            && day <= self.end
            && self.days.as_ref().is_none_or(|days| days.contains(&day))
    }

    /// Returns true if the record passes the level and keyword filters.
    #[must_use]
    pub fn matches(&self, record: &LogRecord) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&record.level) {
            return false;
        }
        match &self.keyword {
            Some(keyword) => record.message.to_lowercase().contains(keyword.as_str()),
            None => true,
        }
    }

    /// Index range of the requested page within `total` results.
    fn window(&self, total: usize) -> (usize, usize) {
        let size = usize::try_from(self.page_size).unwrap_or(usize::MAX);
        let index = usize::try_from(self.page - 1).unwrap_or(usize::MAX);
        let start = index.saturating_mul(size).min(total);
        let end = start.saturating_add(size).min(total);
        (start, end)
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPage {
    /// Records of the page, in the requested order.
    pub logs: Vec<LogRecord>,
    /// Number of records matching the query across all pages.
    pub total: usize,
    /// Page number.
    pub page: i64,
    /// Page size.
    pub page_size: i64,
    /// Days whose buckets were evicted and are being re-ingested; their
    /// records are missing from this page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reloading: Vec<NaiveDate>,
}

impl QueryPage {
    /// Returns true if some requested days were not in memory.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.reloading.is_empty()
    }
}

/// The newest records of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestRecords {
    /// Records, newest first.
    pub logs: Vec<LogRecord>,
    /// Evicted day that cut the walk short, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reloading: Vec<NaiveDate>,
}

impl LatestRecords {
    /// Returns true if an evicted day kept older records out.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.reloading.is_empty()
    }
}

/// Read-only query executor over the cache.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    cache: Arc<CacheStore>,
    registry: Arc<ProjectRegistry>,
}

impl QueryEngine {
    /// Creates a query engine.
    #[must_use]
    pub const fn new(cache: Arc<CacheStore>, registry: Arc<ProjectRegistry>) -> Self {
        Self { cache, registry }
    }

    /// Runs a query.
    pub fn run(&self, query: &LogQuery) -> Result<QueryPage> {
        let plan = query.validate()?;
        if !self.registry.contains(&query.project) {
            return Err(EngineError::UnknownProject(query.project.clone()));
        }

        let (snapshots, reloading) = self.collect(&query.project, |day| plan.covers(day));

        let mut matched: Vec<&LogRecord> = snapshots
            .iter()
            .flat_map(Snapshot::iter)
            .filter(|record| plan.matches(record))
            .collect();
        sort(&mut matched, plan.order);

        let total = matched.len();
        let (start, end) = plan.window(total);
        let logs = matched[start..end].iter().map(|r| (*r).clone()).collect();

        Ok(QueryPage {
            logs,
            total,
            page: plan.page,
            page_size: plan.page_size,
            reloading,
        })
    }

    /// Newest `limit` records of a project.
    ///
    /// Days are visited newest first until `limit` records are gathered.
    /// An evicted day stops the walk, since older days cannot stand in for
    /// it; it is queued for reload and reported in `reloading`.
    pub fn latest(&self, project: &str, limit: usize) -> Result<LatestRecords> {
        if !self.registry.contains(project) {
            return Err(EngineError::UnknownProject(project.to_string()));
        }

        let mut snapshots = Vec::new();
        let mut gathered = 0;
        let mut reloading = Vec::new();
        for key in self.cache.keys_for(project).into_iter().rev() {
            if gathered >= limit {
                break;
            }
            match self.cache.snapshot(&key) {
                SnapshotRead::Present(snapshot) => {
                    gathered += snapshot.len();
                    snapshots.push(snapshot);
                }
                SnapshotRead::Evicted => {
                    reloading.push(key.day);
                    break;
                }
                SnapshotRead::Missing => {}
            }
        }

        let mut records: Vec<&LogRecord> = snapshots.iter().flat_map(Snapshot::iter).collect();
        sort(&mut records, SortOrder::Desc);
        records.truncate(limit);
        Ok(LatestRecords {
            logs: records.into_iter().cloned().collect(),
            reloading,
        })
    }

    /// Snapshots a project's buckets whose day passes `include`, returning
    /// the days that were evicted alongside.
    fn collect(
        &self,
        project: &str,
        include: impl Fn(NaiveDate) -> bool,
    ) -> (Vec<Snapshot>, Vec<NaiveDate>) {
        let mut snapshots = Vec::new();
        let mut reloading = Vec::new();
        for key in self.cache.keys_for(project) {
            if !include(key.day) {
                continue;
            }
            match self.cache.snapshot(&key) {
                SnapshotRead::Present(snapshot) => snapshots.push(snapshot),
                SnapshotRead::Evicted => reloading.push(key.day),
                SnapshotRead::Missing => {}
            }
        }
        (snapshots, reloading)
    }
}

fn sort(records: &mut [&LogRecord], order: SortOrder) {
    match order {
        SortOrder::Asc => records.sort_unstable_by(|a, b| a.chronological_cmp(b)),
        SortOrder::Desc => records.sort_unstable_by(|a, b| b.chronological_cmp(a)),
    }
}
