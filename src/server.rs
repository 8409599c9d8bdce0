//! Assembles every collaborator from `Config` and wires the router, matching
//! the teacher's `serve(config, listener, shutdown)` entrypoint shape.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::api::{self, AppState};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::engine::Engine;
use crate::health::HealthRegistry;
use crate::jobs::JobStore;
use crate::rate_limit::RateLimiter;
use crate::redis::{Client as RedisClient, NullRedisClient, RedisClient as RealRedisClient};
use crate::service::AnalysisService;
use crate::upstream::UpstreamFpl;
use crate::usage::UsageTracker;

pub async fn serve<F>(config: Config, listener: TcpListener, engine: Arc<dyn Engine>, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let redis: Arc<dyn RedisClient + Send + Sync> = if config.redis_enabled() {
        Arc::new(RealRedisClient::new(&config.redis_url).expect("failed to create redis client"))
    } else {
        tracing::warn!("REDIS_URL not set, running in degraded mode (rate limiting, cache and usage tracking fail open)");
        Arc::new(NullRedisClient)
    };

    let upstream = Arc::new(UpstreamFpl::new(config.upstream_timeout_seconds));
    let cache = CacheStore::new(redis.clone());
    let usage = Arc::new(UsageTracker::new(
        redis.clone(),
        upstream.clone(),
        config.usage_limit_per_gw,
    ));
    let rate_limiter = Arc::new(RateLimiter::new(
        redis.clone(),
        config.rate_limit_requests,
        config.rate_limit_window_seconds,
        config.redis_enabled(),
    ));
    let jobs = JobStore::new();
    let health = Arc::new(HealthRegistry::new());

    let service = Arc::new(AnalysisService::new(
        cache.clone(),
        usage.clone(),
        jobs.clone(),
        engine,
        upstream,
        config.cache_ttl_seconds,
    ));

    spawn_job_reaper(jobs.clone(), Duration::from_secs(config.job_retention_seconds));

    let state = AppState {
        service,
        jobs,
        usage,
        cache,
        rate_limiter,
        health,
    };

    let mut app = api::router(state);
    if config.enable_metrics.0 {
        app = crate::metrics::setup_metrics_routes(app);
    }

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap()
}

fn spawn_job_reaper(jobs: JobStore, retention: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            jobs.reap(retention).await;
        }
    });
}
