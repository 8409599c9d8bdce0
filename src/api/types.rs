use serde::{Deserialize, Serialize};

use crate::jobs::{Job, JobStatus};
use crate::overrides::Overrides;
use crate::usage::UsageSummary;

#[derive(Debug, Deserialize)]
pub struct AnalysisRequestBody {
    pub team_id: i32,
    #[serde(default)]
    pub gameweek: Option<i32>,
    #[serde(default)]
    pub overrides: Overrides,
}

/// `spec.md` §6 cache-hit body: `200` with the full result inline.
#[derive(Debug, Serialize)]
pub struct CachedAnalysisResponse {
    pub analysis_id: String,
    pub cached: bool,
    pub result: Box<crate::result::AnalyzedResult>,
}

impl CachedAnalysisResponse {
    pub fn new(result: crate::result::AnalyzedResult) -> Self {
        Self {
            analysis_id: result.analysis_id.clone(),
            cached: true,
            result: Box::new(result),
        }
    }
}

/// `spec.md` §6 accept body: `202` with `status: "queued"`.
#[derive(Debug, Serialize)]
pub struct AcceptedAnalysisResponse {
    pub analysis_id: String,
    pub status: &'static str,
}

impl AcceptedAnalysisResponse {
    pub fn new(analysis_id: String) -> Self {
        Self {
            analysis_id,
            status: "queued",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub team_id: i32,
    pub gameweek: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<crate::jobs::JobError>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            team_id: job.team_id,
            gameweek: job.gameweek,
            progress: job.progress,
            phase: job.phase,
            result: job.result,
            error: job.error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    pub reset_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gameweek: Option<i32>,
}

impl From<UsageSummary> for UsageResponse {
    fn from(summary: UsageSummary) -> Self {
        Self {
            used: summary.used,
            limit: summary.limit,
            remaining: summary.remaining,
            reset_time: summary.reset_time,
            gameweek: summary.gameweek,
        }
    }
}
