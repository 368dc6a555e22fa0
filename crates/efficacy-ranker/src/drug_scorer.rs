//! Per-drug scoring: sequence, pathway, and evidence signals combined into
//! efficacy, confidence, tier, and badges.

use tracing::debug;

use efficacy_common::config::{ConfidenceConfig, ThresholdConfig};
use efficacy_common::entities::clamp_unit;
use efficacy_common::{
    ClinVarPrior, DrugConfig, DrugScoreResult, EvidenceResult, EvidenceTier, InsightScores, PathwayScoreMap,
    Rationale, SeqScore,
};

use crate::confidence::{ConfidenceComposer, ConfidenceInputs};
use crate::normalise::{rescale_pathway, weighted_dot};
use crate::tier::{compute_badges, evidence_tier, TierSignals};

const W_SEQ: f64 = 0.3;
const W_PATH: f64 = 0.4;
const W_EVD: f64 = 0.3;

/// Signals for one request, shared by every drug in the panel.
///
/// Masked categories arrive empty: no seq scores, an empty pathway map, or no
/// evidence / ClinVar.
#[derive(Debug, Clone, Copy)]
pub struct DrugSignals<'a> {
    pub seq_scores: &'a [SeqScore],
    pub pathway_scores: &'a PathwayScoreMap,
    pub evidence: Option<&'a EvidenceResult>,
    pub clinvar: Option<&'a ClinVarPrior>,
    pub insights: Option<&'a InsightScores>,
    /// Upper-cased genes of every submitted variant.
    pub variant_genes: &'a [String],
    pub fusion_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DrugScorer {
    thresholds: ThresholdConfig,
    confidence: ConfidenceConfig,
}

impl DrugScorer {
    pub fn new(thresholds: ThresholdConfig, confidence: ConfidenceConfig) -> Self {
        Self { thresholds, confidence }
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    pub fn score(&self, drug: &DrugConfig, signals: &DrugSignals<'_>) -> DrugScoreResult {
        let s_seq = signals
            .seq_scores
            .iter()
            .map(|s| s.sequence_disruption)
            .fold(0.0_f64, f64::max);
        let seq_pct = signals
            .seq_scores
            .iter()
            .map(|s| s.calibrated_percentile)
            .fold(0.0_f64, f64::max);

        let s_path = weighted_dot(&drug.pathway_weights, signals.pathway_scores);
        let path_pct = rescale_pathway(s_path, self.thresholds.pathway_rescale_divisor);

        let lit = signals.evidence.map(|e| e.strength).unwrap_or(0.0);
        let prior = signals.clinvar.map(|c| c.prior).unwrap_or(0.0);
        let s_evd = clamp_unit(lit + prior);

        let badges = compute_badges(
            path_pct,
            signals.evidence,
            signals.clinvar,
            signals.fusion_active,
            &self.thresholds,
        );
        let tier = evidence_tier(TierSignals { s_seq, s_path: path_pct, s_evd }, &badges, &self.thresholds);

        let composer = ConfidenceComposer::new(&self.confidence, &self.thresholds);
        let (confidence, adjustments) = composer.compose(&ConfidenceInputs {
            tier,
            seq_pct,
            path_pct,
            fusion_active: signals.fusion_active,
            badges: &badges,
            insights: signals.insights,
            clinvar: signals.clinvar,
            drug,
            variant_genes: signals.variant_genes,
            pathway_scores: signals.pathway_scores,
        });

        let blended = (W_SEQ * seq_pct + W_PATH * path_pct + W_EVD * s_evd + prior).max(0.0);
        let efficacy_score = match tier {
            EvidenceTier::Insufficient if signals.fusion_active => blended * 0.5,
            EvidenceTier::Insufficient => 0.0,
            _ => blended,
        };

        debug!(
            drug = %drug.name,
            s_seq, s_path, path_pct, s_evd,
            tier = tier.as_str(),
            confidence,
            "Drug scored"
        );

        DrugScoreResult {
            name: drug.name.clone(),
            moa: drug.moa.clone(),
            efficacy_score: clamp_unit(efficacy_score),
            confidence,
            evidence_tier: tier,
            badges,
            citations: signals.evidence.map(|e| e.filtered.clone()).unwrap_or_default(),
            clinvar: signals.clinvar.cloned(),
            rationale: Rationale {
                s_seq,
                seq_percentile: seq_pct,
                s_path,
                path_percentile: path_pct,
                s_evd,
                clinvar_prior: prior,
                adjustments,
            },
            insights: signals.insights.cloned(),
            calibration_percentile: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathway::{PathwayAggregator, DDR};
    use crate::PanelRegistry;
    use efficacy_common::{Badge, ImpactLevel, ScoringMode, Variant};

    fn scorer() -> DrugScorer {
        DrugScorer::default()
    }

    fn seq(gene: &str, raw: f64, pct: f64, mode: ScoringMode) -> SeqScore {
        SeqScore::new(Variant::new(gene, "1", 100, "A", "G"), raw, pct, ImpactLevel::Moderate, mode)
    }

    #[test]
    fn test_braf_inhibitor_outranks_anti_cd38() {
        let scores = vec![seq("BRAF", 0.03, 0.9, ScoringMode::AdaptiveEnsemble)];
        let map = PathwayAggregator::new(&ThresholdConfig::default()).aggregate(&scores);
        let genes = vec!["BRAF".to_string()];
        let signals = DrugSignals {
            seq_scores: &scores,
            pathway_scores: &map,
            evidence: None,
            clinvar: None,
            insights: None,
            variant_genes: &genes,
            fusion_active: false,
        };
        let panel = PanelRegistry::builtin().panel("multiple_myeloma");
        let results: Vec<_> = panel.iter().map(|d| scorer().score(d, &signals)).collect();
        let braf = results.iter().find(|r| r.name == "BRAF inhibitor").unwrap();
        let cd38 = results.iter().find(|r| r.name == "Anti-CD38").unwrap();
        assert!(braf.confidence > cd38.confidence);
        assert_eq!(braf.evidence_tier, EvidenceTier::Consider);
        assert!(braf.has_badge(Badge::PathwayAligned));
    }

    #[test]
    fn test_insufficient_zeroes_efficacy_unless_fusion() {
        let scores = vec![seq("XYZ", 0.0, 0.0, ScoringMode::FusionPlaceholder)];
        let map = PathwayScoreMap::new();
        let signals = DrugSignals {
            seq_scores: &scores,
            pathway_scores: &map,
            evidence: None,
            clinvar: None,
            insights: None,
            variant_genes: &[],
            fusion_active: false,
        };
        let drug = DrugConfig::new("Olaparib", "PARP", &[(DDR, 0.9)]);
        let r = scorer().score(&drug, &signals);
        assert_eq!(r.evidence_tier, EvidenceTier::Insufficient);
        assert_eq!(r.efficacy_score, 0.0);
        assert_eq!(r.confidence, 0.0);

        let fused = DrugSignals { fusion_active: true, ..signals };
        let r = scorer().score(&drug, &fused);
        assert_eq!(r.confidence, 0.05);
        assert!(r.has_badge(Badge::Fusion));
    }

    #[test]
    fn test_strong_literature_is_supported() {
        let scores = vec![seq("BRCA1", 0.4, 0.9, ScoringMode::AdaptiveEnsemble)];
        let map = PathwayAggregator::new(&ThresholdConfig::default()).aggregate(&scores);
        let evidence = EvidenceResult { strength: 0.8, ..Default::default() };
        let genes = vec!["BRCA1".to_string()];
        let signals = DrugSignals {
            seq_scores: &scores,
            pathway_scores: &map,
            evidence: Some(&evidence),
            clinvar: None,
            insights: None,
            variant_genes: &genes,
            fusion_active: false,
        };
        let panel = PanelRegistry::builtin().panel("ovarian_cancer");
        let olaparib = scorer().score(&panel[0], &signals);
        assert_eq!(olaparib.evidence_tier, EvidenceTier::Supported);
        assert!(olaparib.confidence > 0.9 && olaparib.confidence <= 1.0);
        assert!(olaparib.efficacy_score > 0.0);
        assert!((olaparib.rationale.s_evd - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_hold_for_negative_prior() {
        use efficacy_common::ClinVarClassification;
        let scores = vec![seq("TP53", 0.0, 0.0, ScoringMode::AdaptiveEnsemble)];
        let map = PathwayScoreMap::new();
        let cv = ClinVarPrior::new(ClinVarClassification::Benign, "", -0.2);
        let signals = DrugSignals {
            seq_scores: &scores,
            pathway_scores: &map,
            evidence: None,
            clinvar: Some(&cv),
            insights: None,
            variant_genes: &[],
            fusion_active: false,
        };
        let r = scorer().score(&DrugConfig::new("X", "x", &[("tp53", 1.0)]), &signals);
        assert!(r.efficacy_score >= 0.0);
        assert!((0.0..=1.0).contains(&r.confidence));
    }
}
