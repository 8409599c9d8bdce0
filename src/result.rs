//! Maps an opaque `EngineOutput` onto the wire `Result` schema (`spec.md`
//! §3, §4.7): both engine output shapes land on the same JSON, confidence
//! and priority values are clamped to known enums, and omitted optional
//! sections are left out of the JSON rather than serialized as `null`.

use serde::{Deserialize, Serialize};

use crate::engine::{
    ChipStrategy, Confidence, EngineOutput, LegacyFormOutput, PairFormOutput, PlayerRef, Priority,
    TransferAction,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePlayer {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_pts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ownership_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl From<PlayerRef> for WirePlayer {
    fn from(p: PlayerRef) -> Self {
        Self {
            name: p.name,
            team: p.team,
            position: p.position,
            expected_pts: p.expected_pts,
            ownership_pct: p.ownership_pct,
            rationale: p.rationale,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTransferRecommendation {
    pub action: TransferAction,
    pub player_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_pts: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireChipStrategy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_gw: Option<i32>,
}

impl From<ChipStrategy> for WireChipStrategy {
    fn from(c: ChipStrategy) -> Self {
        Self {
            decision: c.decision,
            rationale: c.rationale,
            timing: c.timing,
            best_gw: c.best_gw,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMeta {
    pub run_id: String,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedResult {
    pub analysis_id: String,
    pub team_id: i32,
    pub current_gw: i32,
    pub primary_decision: String,
    pub confidence: Confidence,
    pub captain: WirePlayer,
    pub vice_captain: WirePlayer,
    pub transfer_recommendations: Vec<WireTransferRecommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chip_strategy: Option<WireChipStrategy>,
    pub starting_xi: Vec<String>,
    pub bench: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_xi: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_bench: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weaknesses: Option<Vec<String>>,
    pub meta: ResultMeta,
}

pub struct ResultTransformer;

impl ResultTransformer {
    pub fn transform(
        output: EngineOutput,
        analysis_id: String,
        team_id: i32,
        current_gw: i32,
        run_id: String,
        generated_at: String,
    ) -> AnalyzedResult {
        match output {
            EngineOutput::Pair(pair) => Self::from_pair(pair, analysis_id, team_id, current_gw, run_id, generated_at),
            EngineOutput::Legacy(legacy) => {
                Self::from_legacy(legacy, analysis_id, team_id, current_gw, run_id, generated_at)
            }
        }
    }

    /// Expands each `TransferPair` into two tagged records (`spec.md`
    /// §4.7): `OUT` carries `transfer_out`'s own reason, `IN` carries the
    /// pair's `in_reason`; both carry the pair's `priority`.
    fn from_pair(
        pair: PairFormOutput,
        analysis_id: String,
        team_id: i32,
        current_gw: i32,
        run_id: String,
        generated_at: String,
    ) -> AnalyzedResult {
        let mut transfer_recommendations = Vec::with_capacity(pair.transfer_recommendations.len() * 2);
        for leg in pair.transfer_recommendations {
            let priority = clamp_priority(leg.priority);
            transfer_recommendations.push(WireTransferRecommendation {
                action: TransferAction::Out,
                player_name: leg.transfer_out.player_name,
                position: leg.transfer_out.position,
                team: leg.transfer_out.team,
                price: leg.transfer_out.price,
                priority,
                reason: leg.transfer_out.reason,
                expected_pts: leg.transfer_out.expected_pts,
            });
            transfer_recommendations.push(WireTransferRecommendation {
                action: TransferAction::In,
                player_name: leg.transfer_in.player_name,
                position: leg.transfer_in.position,
                team: leg.transfer_in.team,
                price: leg.transfer_in.price,
                priority,
                reason: leg.in_reason,
                expected_pts: leg.transfer_in.expected_pts,
            });
        }

        AnalyzedResult {
            analysis_id,
            team_id,
            current_gw,
            primary_decision: pair.primary_decision,
            confidence: clamp_confidence(pair.confidence),
            captain: pair.captain.into(),
            vice_captain: pair.vice_captain.into(),
            transfer_recommendations,
            chip_strategy: pair.chip_strategy.map(Into::into),
            starting_xi: pair.starting_xi,
            bench: pair.bench,
            projected_xi: pair.projected_xi,
            projected_bench: pair.projected_bench,
            weaknesses: pair.weaknesses,
            meta: ResultMeta { run_id, generated_at },
        }
    }

    /// Legacy records already carry `action`; this is a fixed point of the
    /// transform apart from priority clamping.
    fn from_legacy(
        legacy: LegacyFormOutput,
        analysis_id: String,
        team_id: i32,
        current_gw: i32,
        run_id: String,
        generated_at: String,
    ) -> AnalyzedResult {
        let transfer_recommendations = legacy
            .transfer_recommendations
            .into_iter()
            .map(|t| WireTransferRecommendation {
                action: t.action,
                player_name: t.player_name,
                position: t.position,
                team: t.team,
                price: t.price,
                priority: clamp_priority(t.priority),
                reason: t.reason,
                expected_pts: t.expected_pts,
            })
            .collect();

        AnalyzedResult {
            analysis_id,
            team_id,
            current_gw,
            primary_decision: legacy.primary_decision,
            confidence: clamp_confidence(legacy.confidence),
            captain: legacy.captain.into(),
            vice_captain: legacy.vice_captain.into(),
            transfer_recommendations,
            chip_strategy: None,
            starting_xi: legacy.starting_xi,
            bench: legacy.bench,
            projected_xi: None,
            projected_bench: None,
            weaknesses: None,
            meta: ResultMeta { run_id, generated_at },
        }
    }
}

fn clamp_confidence(confidence: Option<Confidence>) -> Confidence {
    confidence.unwrap_or(Confidence::Med)
}

fn clamp_priority(priority: Option<Priority>) -> Priority {
    priority.unwrap_or(Priority::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{TransferLeg, TransferPair};

    fn player(name: &str) -> PlayerRef {
        PlayerRef {
            name: name.to_string(),
            team: None,
            position: None,
            expected_pts: None,
            ownership_pct: None,
            rationale: None,
        }
    }

    fn transfer_leg(name: &str) -> TransferLeg {
        TransferLeg {
            player_name: name.to_string(),
            position: None,
            team: None,
            price: None,
            expected_pts: None,
            reason: None,
        }
    }

    fn pair_output() -> PairFormOutput {
        PairFormOutput {
            primary_decision: "transfer".to_string(),
            confidence: Some(Confidence::High),
            captain: player("Haaland"),
            vice_captain: player("Salah"),
            transfer_recommendations: vec![TransferPair {
                transfer_out: TransferLeg {
                    reason: Some("poor form".to_string()),
                    ..transfer_leg("Toney")
                },
                transfer_in: transfer_leg("Haaland"),
                in_reason: Some("in-form".to_string()),
                priority: Some(Priority::High),
            }],
            chip_strategy: None,
            starting_xi: vec!["Haaland".to_string()],
            bench: vec![],
            projected_xi: None,
            projected_bench: None,
            weaknesses: None,
        }
    }

    #[test]
    fn test_pair_form_emits_two_records_per_pair() {
        let result = ResultTransformer::transform(
            EngineOutput::Pair(pair_output()),
            "a1".to_string(),
            711511,
            22,
            "r1".to_string(),
            "2026-01-01T00:00:00Z".to_string(),
        );
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.captain.name, "Haaland");
        assert_eq!(result.transfer_recommendations.len(), 2);

        let out = &result.transfer_recommendations[0];
        assert_eq!(out.action, TransferAction::Out);
        assert_eq!(out.player_name, "Toney");
        assert_eq!(out.reason.as_deref(), Some("poor form"));
        assert_eq!(out.priority, Priority::High);

        let r#in = &result.transfer_recommendations[1];
        assert_eq!(r#in.action, TransferAction::In);
        assert_eq!(r#in.player_name, "Haaland");
        assert_eq!(r#in.reason.as_deref(), Some("in-form"));
        assert_eq!(r#in.priority, Priority::High);
    }

    #[test]
    fn test_missing_confidence_defaults_to_med() {
        let mut pair = pair_output();
        pair.confidence = None;
        let result = ResultTransformer::transform(
            EngineOutput::Pair(pair),
            "a1".to_string(),
            1,
            22,
            "r1".to_string(),
            "2026-01-01T00:00:00Z".to_string(),
        );
        assert_eq!(result.confidence, Confidence::Med);
    }

    #[test]
    fn test_missing_priority_defaults_to_normal() {
        let mut pair = pair_output();
        pair.transfer_recommendations[0].priority = None;
        let result = ResultTransformer::transform(
            EngineOutput::Pair(pair),
            "a1".to_string(),
            1,
            22,
            "r1".to_string(),
            "2026-01-01T00:00:00Z".to_string(),
        );
        assert!(result
            .transfer_recommendations
            .iter()
            .all(|t| t.priority == Priority::Normal));
    }

    #[test]
    fn test_legacy_form_is_a_fixed_point() {
        use crate::engine::{LegacyFormOutput, TransferRecord};

        let legacy = LegacyFormOutput {
            primary_decision: "transfer".to_string(),
            confidence: Some(Confidence::Low),
            captain: player("Haaland"),
            vice_captain: player("Salah"),
            transfer_recommendations: vec![
                TransferRecord {
                    action: TransferAction::Out,
                    player_name: "Toney".to_string(),
                    position: Some("FWD".to_string()),
                    team: Some("BRE".to_string()),
                    price: Some(7.0),
                    priority: Some(Priority::Urgent),
                    reason: Some("poor form".to_string()),
                    expected_pts: Some("2.1".to_string()),
                },
                TransferRecord {
                    action: TransferAction::In,
                    player_name: "Haaland".to_string(),
                    position: Some("FWD".to_string()),
                    team: Some("MCI".to_string()),
                    price: Some(14.0),
                    priority: Some(Priority::Urgent),
                    reason: Some("in-form".to_string()),
                    expected_pts: Some("9.4".to_string()),
                },
            ],
            starting_xi: vec![],
            bench: vec![],
        };
        let result = ResultTransformer::transform(
            EngineOutput::Legacy(legacy),
            "a1".to_string(),
            1,
            22,
            "r1".to_string(),
            "2026-01-01T00:00:00Z".to_string(),
        );
        assert_eq!(result.transfer_recommendations.len(), 2);
        assert_eq!(result.transfer_recommendations[0].action, TransferAction::Out);
        assert_eq!(result.transfer_recommendations[0].player_name, "Toney");
        assert_eq!(result.transfer_recommendations[1].action, TransferAction::In);
        assert_eq!(result.transfer_recommendations[1].player_name, "Haaland");
        assert!(result.chip_strategy.is_none());
        assert!(result.projected_xi.is_none());
    }

    #[test]
    fn test_optional_sections_omitted_from_json() {
        let result = ResultTransformer::transform(
            EngineOutput::Pair(pair_output()),
            "a1".to_string(),
            1,
            22,
            "r1".to_string(),
            "2026-01-01T00:00:00Z".to_string(),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("chip_strategy").is_none());
        assert!(json.get("projected_xi").is_none());
        assert!(json.get("weaknesses").is_none());
        assert!(json["captain"].get("team").is_none());
    }
}
