//! Override-input contract (`spec.md` §3): manual state callers may inject to
//! steer a single analysis run. All fields are optional; presence of *any*
//! field (even an empty list) is what `AnalysisService` uses to decide
//! whether to bypass the result cache.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskPosture {
    Conservative,
    Balanced,
    Aggressive,
}

impl Default for RiskPosture {
    fn default() -> Self {
        RiskPosture::Balanced
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipName {
    Wildcard,
    FreeHit,
    BenchBoost,
    TripleCaptain,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ManualTransfer {
    pub player_out: String,
    pub player_in: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InjuryStatus {
    Fit,
    Doubtful,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InjuryOverride {
    pub player: String,
    pub status: InjuryStatus,
    pub chance: u8,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Overrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_chips: Option<BTreeSet<ChipName>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_transfers: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_posture: Option<RiskPosture>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_transfers: Option<Vec<ManualTransfer>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injury_overrides: Option<Vec<InjuryOverride>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<HashMap<String, f64>>,
}

impl Overrides {
    /// Any field present at all — even an empty list/set — suppresses the
    /// cache read, per `spec.md` §4.6 step 4 and §6.
    pub fn is_present(&self) -> bool {
        self.available_chips.is_some()
            || self.free_transfers.is_some()
            || self.risk_posture.is_some()
            || self.manual_transfers.is_some()
            || self.injury_overrides.is_some()
            || self.thresholds.is_some()
    }
}
