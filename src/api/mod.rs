//! HTTP surface: route wiring, shared state, and the rate-limit middleware
//! that sits in front of every route (`spec.md` §2, §4.3).

mod error;
mod handlers;
mod types;

pub use error::ApiError;

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use axum_client_ip::InsecureClientIp;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cache::CacheStore;
use crate::health::HealthRegistry;
use crate::jobs::JobStore;
use crate::rate_limit::RateLimiter;
use crate::service::AnalysisService;
use crate::usage::UsageTracker;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AnalysisService>,
    pub jobs: JobStore,
    pub usage: Arc<UsageTracker>,
    pub cache: CacheStore,
    pub rate_limiter: Arc<RateLimiter>,
    pub health: Arc<HealthRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(handlers::start_analysis))
        .route("/analyze/:id", get(handlers::get_analysis))
        .route("/analyze/:id/stream", get(handlers::stream_analysis))
        .route("/usage/:team_id", get(handlers::get_usage))
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    InsecureClientIp(ip): InsecureClientIp,
    req: Request<Body>,
    next: Next,
) -> Response {
    let decision = state.rate_limiter.check(&ip.to_string()).await;
    if !decision.allowed {
        let body = serde_json::json!({
            "error": "rate limited",
            "code": "RATE_LIMITED",
            "detail": { "retry_after": decision.retry_after },
        });
        let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
        if let Ok(v) = axum::http::HeaderValue::from_str(&decision.retry_after.to_string()) {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, v);
        }
        if decision.headers_active {
            insert_rate_limit_headers(&mut response, &decision);
        }
        return response;
    }

    let mut response = next.run(req).await;
    if decision.headers_active {
        insert_rate_limit_headers(&mut response, &decision);
    }
    response
}

fn insert_rate_limit_headers(response: &mut Response, decision: &crate::rate_limit::RateLimitDecision) {
    use axum::http::HeaderValue;

    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.reset_epoch.to_string()) {
        headers.insert("x-ratelimit-reset", v);
    }
}
