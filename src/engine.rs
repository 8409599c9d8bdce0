//! The decision engine is an opaque external collaborator (`spec.md` §1
//! Non-goals, §4.6): this crate only defines the seam it plugs into and
//! reshapes its output into the wire schema. No scoring, projection, or
//! transfer logic lives here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::jobs::JobStore;
use crate::overrides::Overrides;
use crate::upstream::CollectedData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Med,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
    Normal,
}

/// A player reference as the engine reports it: captain, vice-captain, or
/// either leg of a transfer. Only `name`/`player_name` is guaranteed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerRef {
    pub name: String,
    pub team: Option<String>,
    pub position: Option<String>,
    pub expected_pts: Option<String>,
    pub ownership_pct: Option<f64>,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferAction {
    In,
    Out,
}

/// One leg of a transfer pair (`TransferPair::transfer_out`/`transfer_in`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferLeg {
    pub player_name: String,
    pub position: Option<String>,
    pub team: Option<String>,
    pub price: Option<f64>,
    pub expected_pts: Option<String>,
    pub reason: Option<String>,
}

/// A player swap as the pair-form engine emits it: `ResultTransformer`
/// expands this into two `TransferRecord`s (`action=OUT` then `action=IN`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferPair {
    pub transfer_out: TransferLeg,
    pub transfer_in: TransferLeg,
    pub in_reason: Option<String>,
    pub priority: Option<Priority>,
}

/// A single already-tagged transfer entry, matching the stable wire shape.
/// This is both the legacy engine output's transfer shape and the shape
/// `ResultTransformer` produces from a `TransferPair` — the legacy path is a
/// fixed point of the transform.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferRecord {
    pub action: TransferAction,
    pub player_name: String,
    pub position: Option<String>,
    pub team: Option<String>,
    pub price: Option<f64>,
    pub priority: Option<Priority>,
    pub reason: Option<String>,
    pub expected_pts: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChipStrategy {
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub timing: Option<String>,
    pub best_gw: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PairFormOutput {
    pub primary_decision: String,
    pub confidence: Option<Confidence>,
    pub captain: PlayerRef,
    pub vice_captain: PlayerRef,
    pub transfer_recommendations: Vec<TransferPair>,
    pub chip_strategy: Option<ChipStrategy>,
    pub starting_xi: Vec<String>,
    pub bench: Vec<String>,
    pub projected_xi: Option<Vec<String>>,
    pub projected_bench: Option<Vec<String>>,
    pub weaknesses: Option<Vec<String>>,
}

/// Older engines emit one already-tagged record per leg instead of pairs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LegacyFormOutput {
    pub primary_decision: String,
    pub confidence: Option<Confidence>,
    pub captain: PlayerRef,
    pub vice_captain: PlayerRef,
    pub transfer_recommendations: Vec<TransferRecord>,
    pub starting_xi: Vec<String>,
    pub bench: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EngineOutput {
    Pair(PairFormOutput),
    Legacy(LegacyFormOutput),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("ENGINE_TIMEOUT")]
    Timeout,
    #[error("ENGINE_EXCEPTION: {0}")]
    Exception(String),
}

/// Everything the engine needs to produce a decision for one run. Assembled
/// by `AnalysisService` from `UpstreamFpl::collect` plus caller overrides.
pub struct EngineInput {
    pub team_id: i32,
    pub gameweek: i32,
    pub data: CollectedData,
    pub overrides: Overrides,
}

/// Progress callback handed to the engine so it can report intermediate
/// phases through `JobStore` while it runs (`spec.md` §4.8).
pub struct ProgressHandle {
    store: JobStore,
    job_id: String,
}

impl ProgressHandle {
    pub fn new(store: JobStore, job_id: String) -> Self {
        Self { store, job_id }
    }

    pub async fn report(&self, progress: f32, phase: &str) {
        self.store.progress(&self.job_id, progress, phase).await;
    }
}

#[async_trait]
pub trait Engine: Send + Sync {
    async fn analyze(
        &self,
        input: EngineInput,
        progress: &ProgressHandle,
    ) -> Result<EngineOutput, EngineError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Deterministic stand-in used by `service.rs` and `streaming.rs` tests.
    pub struct FakeEngine {
        pub output: EngineOutput,
    }

    #[async_trait]
    impl Engine for FakeEngine {
        async fn analyze(
            &self,
            _input: EngineInput,
            progress: &ProgressHandle,
        ) -> Result<EngineOutput, EngineError> {
            progress.report(0.5, "fetching").await;
            progress.report(1.0, "scoring").await;
            Ok(self.output.clone())
        }
    }

    pub struct FailingEngine;

    #[async_trait]
    impl Engine for FailingEngine {
        async fn analyze(
            &self,
            _input: EngineInput,
            _progress: &ProgressHandle,
        ) -> Result<EngineOutput, EngineError> {
            Err(EngineError::Exception("boom".to_string()))
        }
    }
}
