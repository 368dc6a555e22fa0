//! Request / response DTOs for `predict`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entities::{
    DrugScoreResult, EvidenceTier, PathwayScoreMap, SaeFeatureSet, ScoringMode, SeqScore, Variant,
};
use crate::error::EfficacyError;
use crate::provenance::Provenance;

// ── Ablation ─────────────────────────────────────────────────────────────────

/// Which of the S/P/E signal categories reach the drug scorer.
///
/// Serialized as a compact letter string: `"SPE"`, `"SP"`, `"E"`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AblationMode {
    pub sequence: bool,
    pub pathway: bool,
    pub evidence: bool,
}

impl AblationMode {
    pub const ALL: Self = Self { sequence: true, pathway: true, evidence: true };

    pub fn is_full(&self) -> bool {
        *self == Self::ALL
    }
}

impl Default for AblationMode {
    fn default() -> Self {
        Self::ALL
    }
}

impl fmt::Display for AblationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = String::with_capacity(3);
        if self.sequence {
            s.push('S');
        }
        if self.pathway {
            s.push('P');
        }
        if self.evidence {
            s.push('E');
        }
        f.write_str(&s)
    }
}

impl FromStr for AblationMode {
    type Err = EfficacyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut mode = Self { sequence: false, pathway: false, evidence: false };
        for c in raw.chars().filter(|c| !matches!(c, '+' | ',' | ' ' | '_' | '-')) {
            match c.to_ascii_uppercase() {
                'S' => mode.sequence = true,
                'P' => mode.pathway = true,
                'E' => mode.evidence = true,
                other => {
                    return Err(EfficacyError::Configuration(format!(
                        "unknown ablation signal '{other}' in {raw:?} (expected a subset of S, P, E)"
                    )))
                }
            }
        }
        if !(mode.sequence || mode.pathway || mode.evidence) {
            return Err(EfficacyError::Configuration("ablation mode must keep at least one signal".into()));
        }
        Ok(mode)
    }
}

impl TryFrom<String> for AblationMode {
    type Error = EfficacyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AblationMode> for String {
    fn from(mode: AblationMode) -> Self {
        mode.to_string()
    }
}

// ── Request ──────────────────────────────────────────────────────────────────

fn default_true() -> bool { true }
fn default_model() -> String { "evo2_7b".to_string() }

/// Every recognised request option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficacyOptions {
    /// Try several flank sizes per model instead of the first configured one.
    #[serde(default = "default_true")]
    pub adaptive: bool,
    /// Try every configured ensemble model instead of only `model_id`.
    #[serde(default = "default_true")]
    pub ensemble: bool,
    /// Reduced profile: truncated panel, no literature, no insights.
    #[serde(default)]
    pub fast: bool,
    #[serde(default)]
    pub ablation_mode: AblationMode,
    /// Keep only the first N drugs of the panel.
    #[serde(default)]
    pub limit_panel: Option<usize>,
    #[serde(default)]
    pub include_sae_features: bool,
    #[serde(default)]
    pub disable_literature: bool,
    /// Request only the multi-window delta (no exon-window scan).
    #[serde(default)]
    pub delta_only: Option<bool>,
    /// Average forward and reverse-complement directions.
    #[serde(default)]
    pub symmetry: Option<bool>,
    #[serde(default)]
    pub include_cohort_overlay: bool,
    #[serde(default)]
    pub include_calibration_snapshot: bool,
    /// Drug classes the patient already received (treatment-line modulation).
    #[serde(default)]
    pub treatment_history: Vec<String>,
}

impl Default for EfficacyOptions {
    fn default() -> Self {
        Self {
            adaptive: true,
            ensemble: true,
            fast: false,
            ablation_mode: AblationMode::ALL,
            limit_panel: None,
            include_sae_features: false,
            disable_literature: false,
            delta_only: None,
            symmetry: None,
            include_cohort_overlay: false,
            include_calibration_snapshot: false,
            treatment_history: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficacyRequest {
    pub mutations: Vec<Variant>,
    #[serde(default = "default_model")]
    pub model_id: String,
    #[serde(default)]
    pub options: EfficacyOptions,
    pub disease: String,
}

impl EfficacyRequest {
    pub fn new(mutations: Vec<Variant>, model_id: impl Into<String>, disease: impl Into<String>) -> Self {
        Self {
            mutations,
            model_id: model_id.into(),
            options: EfficacyOptions::default(),
            disease: disease.into(),
        }
    }

    pub fn with_options(mut self, options: EfficacyOptions) -> Self {
        self.options = options;
        self
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// Run-level description of how sequence scoring was configured.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunStrategy {
    pub sequence_mode: Option<ScoringMode>,
    pub adaptive: bool,
    pub ensemble: bool,
    pub delta_only: bool,
    pub symmetry: bool,
    pub fast: bool,
    pub ablation: String,
    pub models_considered: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficacyResponse {
    pub run_signature: String,
    /// Sorted by confidence, highest first.
    pub drugs: Vec<DrugScoreResult>,
    pub evidence_tier: EvidenceTier,
    pub pathway_scores: PathwayScoreMap,
    pub sequence_details: Vec<SeqScore>,
    pub scoring_strategy: RunStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sae_features: Option<Vec<SaeFeatureSet>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cohort_signals: BTreeMap<String, f64>,
    pub provenance: Provenance,
}

impl EfficacyResponse {
    pub fn drug(&self, name: &str) -> Option<&DrugScoreResult> {
        self.drugs.iter().find(|d| d.name == name)
    }

    pub fn rank_of(&self, name: &str) -> Option<usize> {
        self.drugs.iter().position(|d| d.name == name)
    }
}
