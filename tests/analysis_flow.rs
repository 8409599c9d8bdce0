//! End-to-end exercise of the `/analyze` HTTP surface against an in-memory
//! Redis fake and a deterministic engine, driven through the router directly
//! with `tower::ServiceExt::oneshot` rather than a bound TCP listener.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use fpl_sage::api::{self, AppState};
use fpl_sage::cache::CacheStore;
use fpl_sage::engine::{Engine, EngineError, EngineInput, EngineOutput, PairFormOutput, PlayerRef, ProgressHandle};
use fpl_sage::health::HealthRegistry;
use fpl_sage::jobs::JobStore;
use fpl_sage::rate_limit::RateLimiter;
use fpl_sage::redis::MockRedisClient;
use fpl_sage::service::AnalysisService;
use fpl_sage::upstream::UpstreamFpl;
use fpl_sage::usage::UsageTracker;

struct DeterministicEngine;

#[async_trait]
impl Engine for DeterministicEngine {
    async fn analyze(
        &self,
        _input: EngineInput,
        progress: &ProgressHandle,
    ) -> Result<EngineOutput, EngineError> {
        progress.report(1.0, "scoring").await;
        let player = |name: &str| PlayerRef {
            name: name.to_string(),
            team: None,
            position: None,
            expected_pts: None,
            ownership_pct: None,
            rationale: None,
        };
        Ok(EngineOutput::Pair(PairFormOutput {
            primary_decision: "transfer".to_string(),
            confidence: None,
            captain: player("Haaland"),
            vice_captain: player("Salah"),
            transfer_recommendations: vec![],
            chip_strategy: None,
            starting_xi: vec!["Haaland".to_string()],
            bench: vec![],
            projected_xi: None,
            projected_bench: None,
            weaknesses: None,
        }))
    }
}

struct MockUpstream {
    server: mockito::ServerGuard,
    _mocks: Vec<mockito::Mock>,
}

async fn mock_upstream_server() -> MockUpstream {
    let mut server = mockito::Server::new_async().await;
    let mut mocks = Vec::new();

    mocks.push(
        server
            .mock("GET", "/bootstrap-static/")
            .with_status(200)
            .with_body(r#"{"events": [{"id": 22, "is_current": true}]}"#)
            .create_async()
            .await,
    );
    mocks.push(
        server
            .mock("GET", "/fixtures/")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await,
    );
    for path in [
        "/event/22",
        "/entry/711511/",
        "/entry/711511/history/",
        "/entry/711511/event/22/picks/",
        "/event/22/live/",
    ] {
        mocks.push(
            server
                .mock("GET", path)
                .with_status(200)
                .with_body("{}")
                .create_async()
                .await,
        );
    }

    MockUpstream { server, _mocks: mocks }
}

async fn test_app(upstream_base_url: String) -> axum::Router {
    let redis = Arc::new(MockRedisClient::new());
    let upstream = Arc::new(UpstreamFpl::with_base_url(5, upstream_base_url));
    let cache = CacheStore::new(redis.clone());
    let usage = Arc::new(UsageTracker::new(redis.clone(), upstream.clone(), 5));
    let jobs = JobStore::new();
    let service = Arc::new(AnalysisService::new(
        cache.clone(),
        usage.clone(),
        jobs.clone(),
        Arc::new(DeterministicEngine),
        upstream,
        300,
    ));
    let rate_limiter = Arc::new(RateLimiter::new(redis, 100, 3600, false));
    let state = AppState {
        service,
        jobs,
        usage,
        cache,
        rate_limiter,
        health: Arc::new(HealthRegistry::new()),
    };
    api::router(state)
}

#[tokio::test]
async fn test_invalid_team_id_returns_400() {
    let app = test_app("http://127.0.0.1:1".to_string()).await;
    let request = Request::builder()
        .method("POST")
        .uri("/analyze")
        .header("content-type", "application/json")
        .body(Body::from(json!({"team_id": 0}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_valid_request_is_accepted_and_job_is_pollable() {
    let mock_upstream = mock_upstream_server().await;
    let app = test_app(mock_upstream.server.url()).await;
    let request = Request::builder()
        .method("POST")
        .uri("/analyze")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"team_id": 711511, "gameweek": 22}).to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["status"], "queued");
    let job_id = parsed["analysis_id"].as_str().unwrap().to_string();

    // Give the spawned background task a moment to complete.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let status_request = Request::builder()
        .method("GET")
        .uri(format!("/analyze/{job_id}"))
        .body(Body::empty())
        .unwrap();
    let status_response = app.oneshot(status_request).await.unwrap();
    assert_eq!(status_response.status(), StatusCode::OK);
    let status_body = axum::body::to_bytes(status_response.into_body(), usize::MAX)
        .await
        .unwrap();
    let status_json: Value = serde_json::from_slice(&status_body).unwrap();
    assert_eq!(status_json["status"], "completed");
}

#[tokio::test]
async fn test_unknown_job_id_returns_404() {
    let app = test_app("http://127.0.0.1:1".to_string()).await;
    let request = Request::builder()
        .method("GET")
        .uri("/analyze/doesnotexist")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoint_is_reachable() {
    let app = test_app("http://127.0.0.1:1".to_string()).await;
    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
