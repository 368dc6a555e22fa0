//! Confidence composition.
//!
//! Order is part of the contract; the final clamp makes it non-commutative:
//!   1. tier base
//!   2. insight lifts (capped in total)
//!   3. ClinVar alignment bonus
//!   4. gene–drug MoA match bonus
//!   5. DDR-only drug penalty
//!   6. gene-family bumps (HRR→PARP, ARID1A→ATR)
//!   7. clamp to [0, 1]

use efficacy_common::config::{ConfidenceConfig, ThresholdConfig};
use efficacy_common::entities::{clamp_unit, AdjustmentKind, ConfidenceAdjustment};
use efficacy_common::{Badge, ClinVarPrior, DrugConfig, EvidenceTier, InsightScores, PathwayScoreMap};

use crate::pathway::{is_hrr_gene, DDR};

/// Everything the composer reads for one drug.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInputs<'a> {
    pub tier: EvidenceTier,
    pub seq_pct: f64,
    pub path_pct: f64,
    pub fusion_active: bool,
    pub badges: &'a [Badge],
    pub insights: Option<&'a InsightScores>,
    pub clinvar: Option<&'a ClinVarPrior>,
    pub drug: &'a DrugConfig,
    /// Upper-cased genes of the submitted variants.
    pub variant_genes: &'a [String],
    pub pathway_scores: &'a PathwayScoreMap,
}

// (threshold, lift) per insight, in application order
const FUNCTIONALITY_LIFT: (f64, f64) = (0.6, 0.05);
const CHROMATIN_LIFT: (f64, f64) = (0.5, 0.03);
const ESSENTIALITY_LIFT: (f64, f64) = (0.7, 0.07);
const REGULATORY_LIFT: (f64, f64) = (0.6, 0.02);

pub fn tier_base(tier: EvidenceTier, seq_pct: f64, path_pct: f64, fusion_active: bool, fusion_floor: f64) -> f64 {
    match tier {
        EvidenceTier::Supported => 0.6 + 0.2 * seq_pct.max(path_pct),
        EvidenceTier::Consider => 0.3 + 0.1 * seq_pct + 0.1 * path_pct,
        EvidenceTier::Insufficient => {
            let base = 0.15 * seq_pct + 0.10 * path_pct;
            if fusion_active {
                base.max(fusion_floor)
            } else {
                base
            }
        }
    }
}

/// Sum of earned insight lifts, before capping.
pub fn insight_lift(insights: &InsightScores) -> f64 {
    [
        (insights.functionality, FUNCTIONALITY_LIFT),
        (insights.chromatin, CHROMATIN_LIFT),
        (insights.essentiality, ESSENTIALITY_LIFT),
        (insights.regulatory, REGULATORY_LIFT),
    ]
    .into_iter()
    .filter_map(|(value, (threshold, lift))| value.filter(|v| *v >= threshold).map(|_| lift))
    .sum()
}

/// Drug whose every weighted pathway is DDR.
pub fn is_ddr_only(drug: &DrugConfig) -> bool {
    let mut weighted = drug.pathway_weights.iter().filter(|(_, w)| **w > 0.0).peekable();
    weighted.peek().is_some() && weighted.all(|(p, _)| p == DDR)
}

pub struct ConfidenceComposer<'c> {
    cfg: &'c ConfidenceConfig,
    ddr_gate: f64,
}

impl<'c> ConfidenceComposer<'c> {
    pub fn new(cfg: &'c ConfidenceConfig, thresholds: &ThresholdConfig) -> Self {
        Self { cfg, ddr_gate: thresholds.ddr_missense_gate }
    }

    /// Final confidence plus every adjustment applied, in order.
    pub fn compose(&self, inputs: &ConfidenceInputs<'_>) -> (f64, Vec<ConfidenceAdjustment>) {
        let mut adjustments = Vec::new();
        let mut confidence = tier_base(
            inputs.tier,
            inputs.seq_pct,
            inputs.path_pct,
            inputs.fusion_active,
            self.cfg.fusion_insufficient_floor,
        );
        let mut apply = |kind: AdjustmentKind, amount: f64, confidence: &mut f64| {
            if amount != 0.0 {
                *confidence += amount;
                adjustments.push(ConfidenceAdjustment { kind, amount });
            }
        };

        if let Some(insights) = inputs.insights {
            let lift = insight_lift(insights).min(self.cfg.insight_lift_cap);
            apply(AdjustmentKind::InsightLift, lift, &mut confidence);
        }

        if let Some(cv) = inputs.clinvar {
            if cv.prior > 0.0 && inputs.badges.contains(&Badge::PathwayAligned) {
                apply(AdjustmentKind::ClinvarAlignment, cv.prior.min(self.cfg.clinvar_bonus_cap), &mut confidence);
            }
        }

        let targets_variant = inputs
            .drug
            .target_genes
            .iter()
            .any(|t| inputs.variant_genes.iter().any(|g| g.eq_ignore_ascii_case(t)));
        if targets_variant {
            apply(AdjustmentKind::MoaMatch, self.cfg.moa_match_bonus, &mut confidence);
        }

        if !inputs.pathway_scores.is_empty() && is_ddr_only(inputs.drug) {
            let ddr = inputs.pathway_scores.get(DDR).copied().unwrap_or(0.0);
            if ddr < self.ddr_gate {
                apply(AdjustmentKind::DdrOnlyPenalty, -self.cfg.ddr_only_penalty, &mut confidence);
            }
        }

        if inputs.drug.class_is("parp") && inputs.variant_genes.iter().any(|g| is_hrr_gene(g)) {
            apply(AdjustmentKind::HrrParpBump, self.cfg.gene_family_bump, &mut confidence);
        }
        if inputs.drug.class_is("atr") && inputs.variant_genes.iter().any(|g| g.eq_ignore_ascii_case("ARID1A")) {
            apply(AdjustmentKind::Arid1aAtrBump, self.cfg.gene_family_bump, &mut confidence);
        }

        (clamp_unit(confidence), adjustments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use efficacy_common::ClinVarClassification;

    fn parp() -> DrugConfig {
        DrugConfig::new("Olaparib", "PARP_inhibition", &[(DDR, 0.9)])
            .with_targets(&["BRCA1", "BRCA2"])
            .with_class("parp")
    }

    fn inputs<'a>(drug: &'a DrugConfig, genes: &'a [String], map: &'a PathwayScoreMap) -> ConfidenceInputs<'a> {
        ConfidenceInputs {
            tier: EvidenceTier::Consider,
            seq_pct: 0.5,
            path_pct: 0.5,
            fusion_active: false,
            badges: &[],
            insights: None,
            clinvar: None,
            drug,
            variant_genes: genes,
            pathway_scores: map,
        }
    }

    #[test]
    fn test_tier_bases() {
        assert!((tier_base(EvidenceTier::Supported, 0.5, 1.0, false, 0.05) - 0.8).abs() < 1e-9);
        assert!((tier_base(EvidenceTier::Consider, 0.5, 1.0, false, 0.05) - 0.45).abs() < 1e-9);
        assert_eq!(tier_base(EvidenceTier::Insufficient, 0.0, 0.0, false, 0.05), 0.0);
        assert_eq!(tier_base(EvidenceTier::Insufficient, 0.0, 0.0, true, 0.05), 0.05);
    }

    #[test]
    fn test_insight_lift_capped() {
        let all = InsightScores {
            functionality: Some(0.9),
            chromatin: Some(0.9),
            essentiality: Some(0.9),
            regulatory: Some(0.9),
        };
        assert!((insight_lift(&all) - 0.17).abs() < 1e-9);

        let cfg = ConfidenceConfig::default();
        let composer = ConfidenceComposer::new(&cfg, &ThresholdConfig::default());
        let drug = DrugConfig::new("X", "x", &[("tp53", 1.0)]);
        let map = PathwayScoreMap::new();
        let mut i = inputs(&drug, &[], &map);
        i.insights = Some(&all);
        let (conf, adj) = composer.compose(&i);
        assert!((conf - 0.5).abs() < 1e-9);
        assert_eq!(adj[0].amount, 0.10);
    }

    #[test]
    fn test_hrr_parp_stack() {
        let cfg = ConfidenceConfig::default();
        let composer = ConfidenceComposer::new(&cfg, &ThresholdConfig::default());
        let drug = parp();
        let genes = vec!["BRCA1".to_string()];
        let map: PathwayScoreMap = [(DDR.to_string(), 0.6)].into();
        let (conf, adj) = composer.compose(&inputs(&drug, &genes, &map));
        // 0.4 base + 0.10 MoA + 0.08 HRR bump
        assert!((conf - 0.58).abs() < 1e-9);
        let kinds: Vec<_> = adj.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AdjustmentKind::MoaMatch, AdjustmentKind::HrrParpBump]);
    }

    #[test]
    fn test_ddr_only_penalty_without_ddr_signal() {
        let cfg = ConfidenceConfig::default();
        let composer = ConfidenceComposer::new(&cfg, &ThresholdConfig::default());
        let drug = parp();
        let genes = vec!["KRAS".to_string()];
        let map: PathwayScoreMap = [("ras_mapk".to_string(), 0.6)].into();
        let (conf, adj) = composer.compose(&inputs(&drug, &genes, &map));
        assert!((conf - 0.25).abs() < 1e-9);
        assert_eq!(adj[0].kind, AdjustmentKind::DdrOnlyPenalty);

        // pathway signal masked: no penalty
        let empty = PathwayScoreMap::new();
        let (conf, _) = composer.compose(&inputs(&drug, &genes, &empty));
        assert!((conf - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_clinvar_bonus_needs_alignment() {
        let cfg = ConfidenceConfig::default();
        let composer = ConfidenceComposer::new(&cfg, &ThresholdConfig::default());
        let drug = DrugConfig::new("X", "x", &[("tp53", 1.0)]);
        let map = PathwayScoreMap::new();
        let cv = ClinVarPrior::new(ClinVarClassification::Pathogenic, "criteria provided, single submitter", 0.2);
        let mut i = inputs(&drug, &[], &map);
        i.clinvar = Some(&cv);
        assert!((composer.compose(&i).0 - 0.4).abs() < 1e-9);
        let aligned = [Badge::PathwayAligned];
        i.badges = &aligned;
        assert!((composer.compose(&i).0 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_clamped_to_unit() {
        let cfg = ConfidenceConfig::default();
        let composer = ConfidenceComposer::new(&cfg, &ThresholdConfig::default());
        let drug = parp();
        let genes = vec!["BRCA2".to_string()];
        let map: PathwayScoreMap = [(DDR.to_string(), 0.9)].into();
        let insights = InsightScores { essentiality: Some(0.95), ..Default::default() };
        let mut i = inputs(&drug, &genes, &map);
        i.tier = EvidenceTier::Supported;
        i.seq_pct = 1.0;
        i.insights = Some(&insights);
        // 0.8 + 0.07 + 0.10 + 0.08 overshoots
        let (conf, adj) = composer.compose(&i);
        assert_eq!(conf, 1.0);
        assert_eq!(adj.len(), 3);
    }

    #[test]
    fn test_ddr_only_detection() {
        assert!(is_ddr_only(&parp()));
        assert!(!is_ddr_only(&DrugConfig::new("Carboplatin", "x", &[(DDR, 0.7), ("tp53", 0.2)])));
        assert!(!is_ddr_only(&DrugConfig::new("Empty", "x", &[])));
    }
}
