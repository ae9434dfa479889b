//! HTTP request handlers for the dashboard API.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use chrono::NaiveDate;
use logdash_engine::{LogQuery, LogRecord, QueryPage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DashboardError, DashboardResult};
use crate::state::DashboardState;

/// Query parameters for the latest-records endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct CacheParams {
    /// Number of records to return; the configured default when absent.
    pub limit: Option<usize>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status message.
    pub status: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Known projects.
    pub projects: usize,
    /// Records held in memory.
    pub cached_records: usize,
    /// Poll passes completed.
    pub poll_passes: u64,
}

/// Handle GET /api/health - health check endpoint.
pub async fn health_check(State(state): State<Arc<DashboardState>>) -> Json<HealthResponse> {
    let stats = state.engine().stats();
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.uptime_secs(),
        projects: stats.projects,
        cached_records: stats.cached_records,
        poll_passes: stats.passes,
    })
}

/// Handle GET /api/projects - sorted project names.
pub async fn list_projects(State(state): State<Arc<DashboardState>>) -> Json<Vec<String>> {
    Json(state.engine().projects())
}

/// Handle GET /api/projects/{project}/dates - partition days of a project.
pub async fn list_dates(
    State(state): State<Arc<DashboardState>>,
    Path(project): Path<String>,
) -> DashboardResult<Json<Vec<NaiveDate>>> {
    Ok(Json(state.engine().days(&project)?))
}

/// Handle POST /api/logs/query - filtered, sorted, paginated records.
///
/// If the query touches days that were evicted from memory, the handler asks
/// the poller to reload them and waits up to the configured reload timeout
/// before answering.
pub async fn query_logs(
    State(state): State<Arc<DashboardState>>,
    payload: Result<Json<LogQuery>, JsonRejection>,
) -> DashboardResult<Json<QueryPage>> {
    let Json(query) = payload.map_err(|e| DashboardError::InvalidRequest(e.body_text()))?;

    let page = state
        .engine()
        .query_with_reload(&query, state.config().reload_timeout())
        .await?;

    debug!(
        project = %query.project,
        total = page.total,
        returned = page.logs.len(),
        "log query served"
    );
    Ok(Json(page))
}

/// Handle GET /api/logs/cache/{project} - newest records of a project.
///
/// Evicted days among the newest are reloaded first, within the configured
/// reload timeout.
pub async fn get_cached_logs(
    State(state): State<Arc<DashboardState>>,
    Path(project): Path<String>,
    Query(params): Query<CacheParams>,
) -> DashboardResult<Json<Vec<LogRecord>>> {
    let latest = state
        .engine()
        .latest_with_reload(&project, params.limit, state.config().reload_timeout())
        .await?;
    if latest.is_partial() {
        debug!(project = %project, days = ?latest.reloading, "serving latest records without evicted days");
    }
    Ok(Json(latest.logs))
}
