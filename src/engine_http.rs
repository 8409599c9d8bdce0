//! Default `Engine` implementation: delegates the actual decision-making to
//! an external HTTP service at `ENGINE_URL`. The engine itself is out of
//! scope here — this is only the wire glue, grounded in the same
//! request/timeout/classify pattern `upstream.rs` uses for the FPL API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::engine::{Engine, EngineError, EngineInput, EngineOutput, ProgressHandle};

#[derive(Serialize)]
struct EngineRequest<'a> {
    team_id: i32,
    gameweek: i32,
    bootstrap: &'a serde_json::Value,
    fixtures: &'a serde_json::Value,
    entry: &'a Option<serde_json::Value>,
    entry_history: &'a Option<serde_json::Value>,
    picks: &'a Option<serde_json::Value>,
    live: &'a Option<serde_json::Value>,
    overrides: &'a crate::overrides::Overrides,
}

pub struct HttpEngine {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpEngine {
    pub fn new(url: String, timeout_seconds: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }
}

#[async_trait]
impl Engine for HttpEngine {
    async fn analyze(
        &self,
        input: EngineInput,
        progress: &ProgressHandle,
    ) -> Result<EngineOutput, EngineError> {
        progress.report(0.1, "dispatching").await;

        let body = EngineRequest {
            team_id: input.team_id,
            gameweek: input.gameweek,
            bootstrap: &input.data.bootstrap,
            fixtures: &input.data.fixtures,
            entry: &input.data.entry,
            entry_history: &input.data.entry_history,
            picks: &input.data.picks,
            live: &input.data.live,
            overrides: &input.overrides,
        };

        let response = tokio::time::timeout(self.timeout, self.client.post(&self.url).json(&body).send())
            .await
            .map_err(|_| EngineError::Timeout)?
            .map_err(|e| EngineError::Exception(e.to_string()))?;

        progress.report(0.8, "scoring").await;

        if !response.status().is_success() {
            return Err(EngineError::Exception(format!(
                "engine returned status {}",
                response.status()
            )));
        }

        let output = response
            .json::<EngineOutput>()
            .await
            .map_err(|e| EngineError::Exception(format!("failed to parse engine response: {e}")))?;

        progress.report(1.0, "done").await;
        Ok(output)
    }
}
