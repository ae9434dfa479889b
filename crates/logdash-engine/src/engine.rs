//! The engine as one process-scoped value: cache, registry, query engine and
//! the polling loop feeding them.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::poller::{Poller, PollerHandle};
use crate::query::{LatestRecords, LogQuery, QueryEngine, QueryPage};
use crate::registry::ProjectRegistry;

/// Point-in-time engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Known projects.
    pub projects: usize,
    /// Buckets, cached or evicted.
    pub buckets: usize,
    /// Records held in memory.
    pub cached_records: usize,
    /// Poll passes completed.
    pub passes: u64,
}

/// A running log engine.
///
/// Created with [`LogEngine::start`] inside a tokio runtime, torn down with
/// [`LogEngine::shutdown`].
#[derive(Debug)]
pub struct LogEngine {
    config: EngineConfig,
    cache: Arc<CacheStore>,
    registry: Arc<ProjectRegistry>,
    queries: QueryEngine,
    poller: PollerHandle,
}

impl LogEngine {
    /// Validates the configuration and starts polling.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for an invalid configuration.
    pub fn start(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(CacheStore::new());
        let registry = Arc::new(ProjectRegistry::new());
        let queries = QueryEngine::new(Arc::clone(&cache), Arc::clone(&registry));

        let poller = Poller::new(config.clone(), Arc::clone(&cache), Arc::clone(&registry));
        let poller = PollerHandle::spawn(poller, config.poll_interval());
        info!(
            root = %config.log_root.display(),
            poll_interval_secs = config.poll_interval_secs,
            max_cached_records = config.max_cached_records,
            "log engine started"
        );

        Ok(Self {
            config,
            cache,
            registry,
            queries,
            poller,
        })
    }

    /// The configuration the engine runs with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs a query against the current snapshots.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed query or unknown project.
    pub fn query(&self, query: &LogQuery) -> Result<QueryPage> {
        self.queries.run(query)
    }

    /// Runs a query on the blocking pool; if it touched evicted buckets,
    /// waits up to `timeout` for the poller to reload them and runs it again.
    ///
    /// # Errors
    ///
    /// Same as [`LogEngine::query`], plus [`EngineError::Task`] if the
    /// blocking task fails.
    pub async fn query_with_reload(&self, query: &LogQuery, timeout: Duration) -> Result<QueryPage> {
        let page = self.run_blocking(query).await?;
        if !page.is_partial() {
            return Ok(page);
        }
        debug!(project = %query.project, days = ?page.reloading, "query hit evicted buckets");
        if self.poller.request_pass(timeout).await {
            self.run_blocking(query).await
        } else {
            Ok(page)
        }
    }

    /// Newest records of a project, at most `limit` or the configured
    /// default.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownProject`] for an unknown project.
    pub fn latest(&self, project: &str, limit: Option<usize>) -> Result<LatestRecords> {
        self.queries
            .latest(project, limit.unwrap_or(self.config.latest_limit))
    }

    /// Like [`LogEngine::latest`], but while an evicted day cuts the result
    /// short, requests reload passes and reads again, for up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownProject`] for an unknown project.
    pub async fn latest_with_reload(
        &self,
        project: &str,
        limit: Option<usize>,
        timeout: Duration,
    ) -> Result<LatestRecords> {
        let deadline = Instant::now() + timeout;
        let mut latest = self.latest(project, limit)?;
        while latest.is_partial() {
            debug!(project = %project, days = ?latest.reloading, "latest view hit evicted buckets");
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.poller.request_pass(remaining).await {
                break;
            }
            latest = self.latest(project, limit)?;
        }
        Ok(latest)
    }

    /// Known project names, sorted.
    #[must_use]
    pub fn projects(&self) -> Vec<String> {
        self.registry.list()
    }

    /// Partition days of a project, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownProject`] for an unknown project.
    pub fn days(&self, project: &str) -> Result<Vec<NaiveDate>> {
        self.registry
            .days(project)
            .ok_or_else(|| EngineError::UnknownProject(project.to_string()))
    }

    /// Triggers an immediate poll pass and waits for it, up to `timeout`.
    pub async fn refresh(&self, timeout: Duration) -> bool {
        self.poller.request_pass(timeout).await
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            projects: self.registry.len(),
            buckets: self.cache.bucket_count(),
            cached_records: self.cache.total_records(),
            passes: self.poller.passes_completed(),
        }
    }

    async fn run_blocking(&self, query: &LogQuery) -> Result<QueryPage> {
        let queries = self.queries.clone();
        let query = query.clone();
        tokio::task::spawn_blocking(move || queries.run(&query))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))?
    }

    /// Stops the polling loop.
    pub async fn shutdown(&self) {
        self.poller.shutdown().await;
        info!("log engine stopped");
    }
}
