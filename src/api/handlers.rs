use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::instrument;

use super::error::ApiError;
use super::types::{
    AcceptedAnalysisResponse, AnalysisRequestBody, CachedAnalysisResponse, JobStatusResponse, UsageResponse,
};
use super::AppState;
use crate::service::{AnalysisRequest, Outcome};
use crate::streaming;

const MIN_TEAM_ID: i32 = 1;
const MAX_TEAM_ID: i32 = 20_000_000;

fn validate_team_id(team_id: i32) -> Result<(), ApiError> {
    if !(MIN_TEAM_ID..=MAX_TEAM_ID).contains(&team_id) {
        return Err(ApiError::InvalidTeamId);
    }
    Ok(())
}

#[instrument(skip(state, body), fields(team_id = body.team_id, gameweek = ?body.gameweek))]
pub async fn start_analysis(
    State(state): State<AppState>,
    Json(body): Json<AnalysisRequestBody>,
) -> Result<Response, ApiError> {
    let outcome = state
        .service
        .start(AnalysisRequest {
            team_id: body.team_id,
            gameweek: body.gameweek,
            overrides: body.overrides,
        })
        .await;

    match outcome {
        Outcome::CachedHit(result) => {
            Ok((StatusCode::OK, Json(CachedAnalysisResponse::new(result))).into_response())
        }
        Outcome::Accepted(job) => Ok((
            StatusCode::ACCEPTED,
            Json(AcceptedAnalysisResponse::new(job.id)),
        )
            .into_response()),
        Outcome::Rejected(reason) => Err(reason.into()),
    }
}

#[instrument(skip(state))]
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = state.jobs.get(&job_id).await.ok_or(ApiError::AnalysisNotFound)?;
    Ok(Json(job.into()))
}

#[instrument(skip(state, ws))]
pub async fn stream_analysis(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let jobs = state.jobs.clone();
    ws.on_upgrade(move |socket| streaming::run_socket(socket, job_id, jobs))
}

#[instrument(skip(state))]
pub async fn get_usage(
    State(state): State<AppState>,
    Path(team_id): Path<i32>,
) -> Result<Json<UsageResponse>, ApiError> {
    validate_team_id(team_id)?;
    let summary = state.usage.get_usage(team_id).await;
    Ok(Json(summary.into()))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    state.health.status()
}
