//! Orchestrates one `/analyze` request end to end (`spec.md` §4.6): validate,
//! check usage, check cache, create a job, and hand the actual engine run
//! off to a background task so the HTTP response can return immediately.
//!
//! Season resolution for a caller-omitted gameweek happens inside the
//! background task, not here: an accepted request must never be demoted to
//! an HTTP-level error once it has a job id (`spec.md` §7).

use std::sync::Arc;

use chrono::Utc;

use crate::cache::{analysis_cache_key, CacheStore};
use crate::engine::{Engine, EngineInput, ProgressHandle};
use crate::jobs::{Job, JobStore};
use crate::overrides::Overrides;
use crate::result::{AnalyzedResult, ResultTransformer};
use crate::upstream::{resolve_current_gameweek, CollectionError, UpstreamFpl};
use crate::usage::UsageTracker;

const MIN_TEAM_ID: i32 = 1;
const MAX_TEAM_ID: i32 = 20_000_000;

pub struct AnalysisRequest {
    pub team_id: i32,
    pub gameweek: Option<i32>,
    pub overrides: Overrides,
}

#[derive(Debug)]
pub enum RejectReason {
    InvalidTeamId,
    InvalidGameweek,
    UsageLimitReached { used: u64, limit: u64, reset_epoch: u64 },
}

pub enum Outcome {
    CachedHit(AnalyzedResult),
    Accepted(Job),
    Rejected(RejectReason),
}

pub struct AnalysisService {
    cache: CacheStore,
    usage: Arc<UsageTracker>,
    jobs: JobStore,
    engine: Arc<dyn Engine>,
    upstream: Arc<UpstreamFpl>,
    cache_ttl_seconds: u64,
}

impl AnalysisService {
    pub fn new(
        cache: CacheStore,
        usage: Arc<UsageTracker>,
        jobs: JobStore,
        engine: Arc<dyn Engine>,
        upstream: Arc<UpstreamFpl>,
        cache_ttl_seconds: u64,
    ) -> Self {
        Self {
            cache,
            usage,
            jobs,
            engine,
            upstream,
            cache_ttl_seconds,
        }
    }

    pub async fn start(&self, request: AnalysisRequest) -> Outcome {
        if !(MIN_TEAM_ID..=MAX_TEAM_ID).contains(&request.team_id) {
            return Outcome::Rejected(RejectReason::InvalidTeamId);
        }
        if let Some(gw) = request.gameweek {
            if !(1..=38).contains(&gw) {
                return Outcome::Rejected(RejectReason::InvalidGameweek);
            }
        }

        let usage_check = self.usage.check_limit(request.team_id).await;
        if !usage_check.allowed {
            return Outcome::Rejected(RejectReason::UsageLimitReached {
                used: usage_check.used,
                limit: usage_check.limit,
                reset_epoch: usage_check.reset_epoch,
            });
        }

        let has_overrides = request.overrides.is_present();
        if !has_overrides {
            let key = analysis_cache_key(request.team_id, request.gameweek);
            if let Some(raw) = self.cache.get(&key).await {
                if let Ok(cached) = serde_json::from_str::<AnalyzedResult>(&raw) {
                    return Outcome::CachedHit(cached);
                }
            }
        }

        let job = self.jobs.create(request.team_id, request.gameweek).await;
        self.spawn_background_run(job.clone(), request.gameweek, request.overrides, has_overrides);
        Outcome::Accepted(job)
    }

    /// Resolves a caller-omitted gameweek, fails the job with
    /// `SEASON_RESOLUTION_UNKNOWN` on failure, runs the engine, caches the
    /// result under the key the caller's original request would hit, and
    /// records usage against the resolved gameweek.
    fn spawn_background_run(
        &self,
        job: Job,
        requested_gameweek: Option<i32>,
        overrides: Overrides,
        has_overrides: bool,
    ) {
        let jobs = self.jobs.clone();
        let cache = self.cache.clone();
        let usage = self.usage.clone();
        let engine = self.engine.clone();
        let upstream = self.upstream.clone();
        let cache_ttl_seconds = self.cache_ttl_seconds;

        tokio::spawn(async move {
            jobs.mark_running(&job.id).await;

            let gameweek = match requested_gameweek {
                Some(gw) => gw,
                None => {
                    let outcome = upstream.fetch_bootstrap().await;
                    let resolved = outcome
                        .body
                        .as_ref()
                        .and_then(|bootstrap| resolve_current_gameweek(bootstrap).ok());
                    match resolved {
                        Some(gw) => gw,
                        None => {
                            jobs.fail(
                                &job.id,
                                "SEASON_RESOLUTION_UNKNOWN",
                                "could not resolve current gameweek",
                            )
                            .await;
                            return;
                        }
                    }
                }
            };
            jobs.set_gameweek(&job.id, gameweek).await;

            let collected = match upstream.collect(job.team_id, gameweek).await {
                Ok(data) => data,
                Err(CollectionError::UpstreamUnavailable) => {
                    jobs.fail(&job.id, "UPSTREAM_UNAVAILABLE", "upstream FPL API unavailable")
                        .await;
                    return;
                }
            };

            let progress = ProgressHandle::new(jobs.clone(), job.id.clone());
            let input = EngineInput {
                team_id: job.team_id,
                gameweek,
                data: collected,
                overrides,
            };

            let output = match engine.analyze(input, &progress).await {
                Ok(output) => output,
                Err(e) => {
                    let (code, message) = match e {
                        crate::engine::EngineError::Timeout => {
                            ("ENGINE_TIMEOUT".to_string(), "engine run timed out".to_string())
                        }
                        crate::engine::EngineError::Exception(msg) => ("ENGINE_EXCEPTION".to_string(), msg),
                    };
                    jobs.fail(&job.id, &code, &message).await;
                    return;
                }
            };

            let run_id = crate::jobs::generate_job_id();
            let generated_at = Utc::now().to_rfc3339();
            let result = ResultTransformer::transform(
                output,
                job.id.clone(),
                job.team_id,
                gameweek,
                run_id,
                generated_at,
            );

            if !has_overrides {
                if let Ok(serialized) = serde_json::to_string(&result) {
                    let key = analysis_cache_key(job.team_id, requested_gameweek);
                    cache.put(&key, &serialized, cache_ttl_seconds).await;
                }
            }
            usage.record_analysis(job.team_id, gameweek).await;

            let result_json = serde_json::to_value(&result).unwrap_or(serde_json::Value::Null);
            jobs.complete(&job.id, result_json).await;
        });
    }
}
