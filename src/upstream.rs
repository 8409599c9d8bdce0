//! Fetches bootstrap/fixtures/events/entry/picks/live data from
//! `fantasy.premierleague.com/api/*` (`spec.md` §4.1).
//!
//! The upstream is treated as a read-only remote: every call is classified
//! into one of `FetchOutcome`'s variants rather than bubbling a raw HTTP
//! error, so callers never have to interpret status codes themselves.

use std::time::Duration;

use serde_json::Value;

const BASE_URL: &str = "https://fantasy.premierleague.com/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Ok,
    Unavailable404,
    FailedTimeout,
    FailedParse,
    Failed,
}

pub struct FetchOutcome {
    pub status: FetchStatus,
    pub body: Option<Value>,
}

impl FetchOutcome {
    fn ok(body: Value) -> Self {
        Self {
            status: FetchStatus::Ok,
            body: Some(body),
        }
    }

    fn failed(status: FetchStatus) -> Self {
        Self { status, body: None }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SeasonResolutionError {
    #[error("SEASON_RESOLUTION_UNKNOWN")]
    Unknown,
}

pub struct CollectedData {
    pub bootstrap: Value,
    pub fixtures: Value,
    pub event: Option<Value>,
    pub entry: Option<Value>,
    pub entry_history: Option<Value>,
    pub picks: Option<Value>,
    pub live: Option<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("UPSTREAM_UNAVAILABLE")]
    UpstreamUnavailable,
}

pub struct UpstreamFpl {
    client: reqwest::Client,
    timeout: Duration,
    base_url: String,
}

impl UpstreamFpl {
    pub fn new(timeout_seconds: u64) -> Self {
        Self::with_base_url(timeout_seconds, BASE_URL.to_string())
    }

    /// Used in tests to point at a local mock server instead of the real API.
    pub fn with_base_url(timeout_seconds: u64, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("fpl-sage/0.1")
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            timeout: Duration::from_secs(timeout_seconds),
            base_url,
        }
    }

    async fn fetch(&self, path: &str) -> FetchOutcome {
        let url = format!("{}{path}", self.base_url);
        let response = match tokio::time::timeout(self.timeout, self.client.get(&url).send()).await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, url, "upstream request failed");
                return FetchOutcome::failed(FetchStatus::Failed);
            }
            Err(_) => {
                tracing::warn!(url, "upstream request timed out");
                return FetchOutcome::failed(FetchStatus::FailedTimeout);
            }
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return FetchOutcome::failed(FetchStatus::Unavailable404);
        }
        if !response.status().is_success() {
            return FetchOutcome::failed(FetchStatus::Failed);
        }

        match response.json::<Value>().await {
            Ok(body) => FetchOutcome::ok(body),
            Err(e) => {
                tracing::warn!(error = %e, url, "failed to parse upstream response");
                FetchOutcome::failed(FetchStatus::FailedParse)
            }
        }
    }

    pub async fn fetch_bootstrap(&self) -> FetchOutcome {
        self.fetch("/bootstrap-static/").await
    }

    pub async fn fetch_fixtures(&self) -> FetchOutcome {
        self.fetch("/fixtures/").await
    }

    pub async fn fetch_event(&self, gw: i32) -> FetchOutcome {
        self.fetch(&format!("/event/{gw}")).await
    }

    pub async fn fetch_entry(&self, team_id: i32) -> FetchOutcome {
        self.fetch(&format!("/entry/{team_id}/")).await
    }

    pub async fn fetch_entry_history(&self, team_id: i32) -> FetchOutcome {
        self.fetch(&format!("/entry/{team_id}/history/")).await
    }

    pub async fn fetch_picks(&self, team_id: i32, gw: i32) -> FetchOutcome {
        self.fetch(&format!("/entry/{team_id}/event/{gw}/picks/"))
            .await
    }

    pub async fn fetch_live(&self, gw: i32) -> FetchOutcome {
        self.fetch(&format!("/event/{gw}/live/")).await
    }

    /// Collects everything `AnalysisService` needs for one team/gameweek run.
    /// Bootstrap and fixtures are required: any non-`Ok` status there fails
    /// the whole collection. Picks and live are best-effort.
    pub async fn collect(&self, team_id: i32, gw: i32) -> Result<CollectedData, CollectionError> {
        let bootstrap = self.fetch_bootstrap().await;
        if bootstrap.status != FetchStatus::Ok {
            return Err(CollectionError::UpstreamUnavailable);
        }
        let fixtures = self.fetch_fixtures().await;
        if fixtures.status != FetchStatus::Ok {
            return Err(CollectionError::UpstreamUnavailable);
        }

        let event = self.fetch_event(gw).await;
        let entry = self.fetch_entry(team_id).await;
        let entry_history = self.fetch_entry_history(team_id).await;
        let picks = self.fetch_picks(team_id, gw).await;
        let live = self.fetch_live(gw).await;

        Ok(CollectedData {
            bootstrap: bootstrap.body.expect("checked Ok above"),
            fixtures: fixtures.body.expect("checked Ok above"),
            event: event.body,
            entry: entry.body,
            entry_history: entry_history.body,
            picks: picks.body,
            live: live.body,
        })
    }
}

/// Returns the first event with `is_current=true`; if none, the first event
/// with `is_next=true`; else `SEASON_RESOLUTION_UNKNOWN`. Pure: operates on an
/// already-parsed bootstrap payload, no network call.
pub fn resolve_current_gameweek(bootstrap: &Value) -> Result<i32, SeasonResolutionError> {
    let events = bootstrap
        .get("events")
        .and_then(Value::as_array)
        .ok_or(SeasonResolutionError::Unknown)?;

    let current = events
        .iter()
        .find(|e| e.get("is_current").and_then(Value::as_bool) == Some(true));
    if let Some(event) = current {
        return event
            .get("id")
            .and_then(Value::as_i64)
            .map(|id| id as i32)
            .ok_or(SeasonResolutionError::Unknown);
    }

    let next = events
        .iter()
        .find(|e| e.get("is_next").and_then(Value::as_bool) == Some(true));
    if let Some(event) = next {
        return event
            .get("id")
            .and_then(Value::as_i64)
            .map(|id| id as i32)
            .ok_or(SeasonResolutionError::Unknown);
    }

    Err(SeasonResolutionError::Unknown)
}

/// The upstream `deadline_time` of the given gameweek's event, as a unix
/// epoch, if resolvable.
pub fn resolve_gameweek_deadline(bootstrap: &Value, gw: i32) -> Option<i64> {
    bootstrap
        .get("events")
        .and_then(Value::as_array)?
        .iter()
        .find(|e| e.get("id").and_then(Value::as_i64) == Some(gw as i64))
        .and_then(|e| e.get("deadline_time"))
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
}
