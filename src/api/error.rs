//! Crate-wide HTTP error type (`spec.md` §7): every rejection reason from
//! every layer (validation, rate limiting, usage) funnels through this one
//! `IntoResponse` impl so handlers never hand-build error bodies. Upstream
//! and engine failures on an already-accepted job never reach this type —
//! they surface only as a job error frame (`jobs::JobError`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::service::RejectReason;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid team_id")]
    InvalidTeamId,
    #[error("invalid gameweek")]
    InvalidGameweek,
    #[error("validation error: {0}")]
    Validation(String),
    #[error("rate limited")]
    RateLimited { retry_after: u64 },
    #[error("usage limit reached")]
    UsageLimitReached {
        used: u64,
        limit: u64,
        reset_epoch: u64,
    },
    #[error("analysis not found")]
    AnalysisNotFound,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidTeamId => "INVALID_TEAM_ID",
            ApiError::InvalidGameweek => "INVALID_GAMEWEEK",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::UsageLimitReached { .. } => "USAGE_LIMIT_REACHED",
            ApiError::AnalysisNotFound => "ANALYSIS_NOT_FOUND",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidTeamId | ApiError::InvalidGameweek | ApiError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::UsageLimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::AnalysisNotFound => StatusCode::NOT_FOUND,
        }
    }

    fn detail(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::RateLimited { retry_after } => Some(json!({ "retry_after": retry_after })),
            ApiError::UsageLimitReached {
                used,
                limit,
                reset_epoch,
            } => Some(json!({ "used": used, "limit": limit, "reset_time": reset_epoch })),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
            detail: self.detail(),
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after } = &self {
            if let Ok(v) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, v);
            }
        }
        response
    }
}

impl From<RejectReason> for ApiError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::InvalidTeamId => ApiError::InvalidTeamId,
            RejectReason::InvalidGameweek => ApiError::InvalidGameweek,
            RejectReason::UsageLimitReached {
                used,
                limit,
                reset_epoch,
            } => ApiError::UsageLimitReached {
                used,
                limit,
                reset_epoch,
            },
        }
    }
}
