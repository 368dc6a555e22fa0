//! Run provenance: every fallback, timeout, and skip decision made during one
//! prediction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::ScoringMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    EvidenceTimeout,
    EvidenceUnavailable,
    EvidenceAblated,
    LiteratureDisabled,
    ClinvarUnavailable,
    InsightsTimeout,
    InsightsUnavailable,
    FastMode,
    SequenceEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    Fusion,
    AdaptiveEnsemble,
    LargeContext,
}

/// What happened when the fallback chain visited one scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Disabled,
    Ineligible,
    Empty,
    Produced { count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub scorer: ScorerKind,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub run_id: String,
    pub model_id: String,
    pub disease: String,
    pub generated_at: DateTime<Utc>,
    pub ablation: String,
    /// First fallback taken during the run, if any.
    pub fallback: Option<FallbackReason>,
    #[serde(default)]
    pub fallback_reasons: Vec<FallbackReason>,
    #[serde(default)]
    pub sequence_chain: Vec<ChainStep>,
    pub sequence_mode: Option<ScoringMode>,
    #[serde(default)]
    pub skipped_variants: Vec<String>,
    #[serde(default)]
    pub timings_ms: BTreeMap<String, u64>,
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
    #[serde(default)]
    pub omitted_features: Vec<String>,
}

impl Provenance {
    pub fn new(run_id: impl Into<String>, model_id: impl Into<String>, disease: impl Into<String>, ablation: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            model_id: model_id.into(),
            disease: disease.into(),
            generated_at: Utc::now(),
            ablation: ablation.into(),
            fallback: None,
            fallback_reasons: vec![],
            sequence_chain: vec![],
            sequence_mode: None,
            skipped_variants: vec![],
            timings_ms: BTreeMap::new(),
            flags: BTreeMap::new(),
            omitted_features: vec![],
        }
    }

    pub fn record_fallback(&mut self, reason: FallbackReason) {
        if self.fallback.is_none() {
            self.fallback = Some(reason);
        }
        if !self.fallback_reasons.contains(&reason) {
            self.fallback_reasons.push(reason);
        }
    }

    pub fn has_fallback(&self, reason: FallbackReason) -> bool {
        self.fallback_reasons.contains(&reason)
    }

    pub fn flag(&mut self, name: &str, enabled: bool) {
        self.flags.insert(name.to_string(), enabled);
    }

    pub fn timing(&mut self, stage: &str, elapsed_ms: u64) {
        self.timings_ms.insert(stage.to_string(), elapsed_ms);
    }

    pub fn omit_feature(&mut self, feature: &str) {
        self.omitted_features.push(feature.to_string());
        self.flags.insert(feature.to_string(), false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fallback_wins() {
        let mut p = Provenance::new("run", "evo2_1b", "ovarian_cancer", "SPE");
        p.record_fallback(FallbackReason::EvidenceTimeout);
        p.record_fallback(FallbackReason::InsightsTimeout);
        p.record_fallback(FallbackReason::EvidenceTimeout);
        assert_eq!(p.fallback, Some(FallbackReason::EvidenceTimeout));
        assert_eq!(p.fallback_reasons.len(), 2);
    }

    #[test]
    fn test_fallback_serializes_snake_case() {
        let mut p = Provenance::new("run", "evo2_1b", "mm", "SP");
        p.record_fallback(FallbackReason::EvidenceTimeout);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["fallback"], "evidence_timeout");
    }

    #[test]
    fn test_chain_step_flattened() {
        let step = ChainStep { scorer: ScorerKind::Fusion, outcome: StepOutcome::Produced { count: 2 } };
        let json = serde_json::to_value(step).unwrap();
        assert_eq!(json["scorer"], "fusion");
        assert_eq!(json["outcome"], "produced");
        assert_eq!(json["count"], 2);
    }
}
