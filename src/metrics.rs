//! Metric names and the `/metrics` Prometheus exposition route, grounded in
//! the same `metrics`/`metrics-exporter-prometheus` stack the rest of this
//! codebase uses for HTTP services.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const ANALYSIS_ACCEPTED_COUNTER: &str = "fpl_sage_analysis_accepted_total";
pub const ANALYSIS_CACHE_HIT_COUNTER: &str = "fpl_sage_analysis_cache_hit_total";
pub const ANALYSIS_REJECTED_COUNTER: &str = "fpl_sage_analysis_rejected_total";
pub const ENGINE_RUN_DURATION: &str = "fpl_sage_engine_run_duration_ms";
pub const UPSTREAM_FETCH_FAILURE_COUNTER: &str = "fpl_sage_upstream_fetch_failure_total";

pub fn setup_metrics_recorder() -> PrometheusHandle {
    const BUCKETS: &[f64] = &[
        10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(BUCKETS)
        .expect("bucket list is non-empty")
        .install_recorder()
        .expect("failed to install prometheus recorder")
}

/// Adds `/metrics` and request-latency middleware to a router. Call last, as
/// the middleware wraps everything already registered.
pub fn setup_metrics_routes(router: Router) -> Router {
    let handle = setup_metrics_recorder();

    router
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .layer(axum::middleware::from_fn(track_http_metrics))
}

async fn track_http_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let method = req.method().clone();

    let response = next.run(req).await;

    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16().to_string();

    metrics::histogram!(
        "fpl_sage_http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path,
        "status" => status,
    )
    .record(latency_ms);

    response
}
