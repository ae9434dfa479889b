//! Route configuration for the dashboard API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::DashboardConfig;
use crate::handlers::{get_cached_logs, health_check, list_dates, list_projects, query_logs};
use crate::state::DashboardState;

/// Create the dashboard API router.
pub fn create_router(state: Arc<DashboardState>) -> Router {
    let cors = build_cors_layer(state.config());

    let api_routes = Router::new()
        .route("/health", get(health_check))
        // Projects
        .route("/projects", get(list_projects))
        .route("/projects/{project}/dates", get(list_dates))
        // Logs
        .route("/logs/query", post(query_logs))
        .route("/logs/cache/{project}", get(get_cached_logs));

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &DashboardConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use logdash_engine::{EngineConfig, LogEngine};
    use std::time::Duration;
    use tower::ServiceExt;

    async fn make_test_state(dir: &tempfile::TempDir, config: DashboardConfig) -> Arc<DashboardState> {
        let project = dir.path().join("shop");
        std::fs::create_dir_all(&project).expect("create dir");
        std::fs::write(
            project.join("2024-05-01.log"),
            "2024-05-01 10:00:00 INFO a\n2024-05-01 10:00:00 ERROR b\n2024-05-01 10:01:00 INFO c\n",
        )
        .expect("write log");

        let engine_config = EngineConfig::new(dir.path()).with_poll_interval_secs(3600);
        let engine = LogEngine::start(engine_config.clone()).expect("engine starts");
        assert!(engine.refresh(Duration::from_secs(5)).await);
        Arc::new(DashboardState::new(
            config.with_engine(engine_config),
            Arc::new(engine),
        ))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn post_query(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/logs/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router(make_test_state(&dir, DashboardConfig::default()).await);

        let request = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_projects_and_dates_endpoints() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router(make_test_state(&dir, DashboardConfig::default()).await);

        let request = Request::builder()
            .uri("/api/projects")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!(["shop"]));

        let request = Request::builder()
            .uri("/api/projects/shop/dates")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(json_body(response).await, serde_json::json!(["2024-05-01"]));

        let request = Request::builder()
            .uri("/api/projects/ghost/dates")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_query_endpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router(make_test_state(&dir, DashboardConfig::default()).await);

        let response = app
            .oneshot(post_query(
                r#"{"project":"shop","start_date":"2024-05-01","end_date":"2024-05-01",
                    "levels":["INFO"],"order":"desc","page":1,"page_size":10}"#,
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["total"], 2);
        assert_eq!(json["page"], 1);
        assert_eq!(json["page_size"], 10);
        assert_eq!(json["logs"][0]["message"], "c");
        assert_eq!(json["logs"][0]["level"], "INFO");
        assert_eq!(json["logs"][1]["message"], "a");
        assert!(json.get("reloading").is_none());
    }

    #[tokio::test]
    async fn test_query_endpoint_page_past_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router(make_test_state(&dir, DashboardConfig::default()).await);

        let response = app
            .oneshot(post_query(
                r#"{"project":"shop","start_date":"2024-05-01","end_date":"2024-05-01","page":5,"page_size":50}"#,
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["total"], 3);
        assert_eq!(json["logs"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_query_endpoint_rejections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router(make_test_state(&dir, DashboardConfig::default()).await);

        let cases = [
            (
                r#"{"project":"shop","start_date":"2024-05-02","end_date":"2024-05-01","page_size":10}"#,
                StatusCode::BAD_REQUEST,
            ),
            (
                r#"{"project":"shop","start_date":"2024-05-01","end_date":"2024-05-01"}"#,
                StatusCode::BAD_REQUEST,
            ),
            (
                r#"{"project":"shop","start_date":"2024-05-01","end_date":"2024-05-01","page_size":0}"#,
                StatusCode::BAD_REQUEST,
            ),
            (r#"{"project":"shop"}"#, StatusCode::BAD_REQUEST),
            (
                r#"{"project":"ghost","start_date":"2024-05-01","end_date":"2024-05-01","page_size":10}"#,
                StatusCode::NOT_FOUND,
            ),
        ];

        for (body, expected) in cases {
            let response = app.clone().oneshot(post_query(body)).await.expect("response");
            assert_eq!(response.status(), expected, "body: {body}");
            let json = json_body(response).await;
            assert!(json["message"].is_string(), "body: {body}");
        }
    }

    #[tokio::test]
    async fn test_cache_endpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router(make_test_state(&dir, DashboardConfig::default()).await);

        let request = Request::builder()
            .uri("/api/logs/cache/shop?limit=1")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json.as_array().map(Vec::len), Some(1));
        assert_eq!(json[0]["message"], "c");
    }

    #[tokio::test]
    async fn test_cors_any_origin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router(make_test_state(&dir, DashboardConfig::default()).await);

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/health")
            .header("Origin", "http://example.com")
            .header("Access-Control-Request-Method", "GET")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");

        assert!(response.status().is_success());
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&header::HeaderValue::from_static("*"))
        );
    }

    #[tokio::test]
    async fn test_cors_specific_origins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = DashboardConfig::default().with_cors_origin("http://localhost:3000");
        let app = create_router(make_test_state(&dir, config).await);

        let request = Request::builder()
            .uri("/api/health")
            .header("Origin", "http://localhost:3000")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");

        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&header::HeaderValue::from_static("http://localhost:3000"))
        );
    }

    #[tokio::test]
    async fn test_unknown_endpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router(make_test_state(&dir, DashboardConfig::default()).await);

        let request = Request::builder()
            .uri("/api/unknown")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
