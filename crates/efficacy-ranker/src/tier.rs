//! Evidence tier and badges.

use efficacy_common::config::ThresholdConfig;
use efficacy_common::{Badge, ClinVarPrior, EvidenceResult, EvidenceTier};

/// The normalised signals a tier decision is made from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierSignals {
    pub s_seq: f64,
    /// Rescaled pathway alignment.
    pub s_path: f64,
    pub s_evd: f64,
}

/// Pure function of signals, badges, and thresholds.
///
/// supported: strong literature, or ClinVar-Strong with pathway alignment.
/// insufficient: every signal under its floor. Otherwise consider.
pub fn evidence_tier(signals: TierSignals, badges: &[Badge], t: &ThresholdConfig) -> EvidenceTier {
    let clinvar_strong = badges.contains(&Badge::ClinVarStrong);
    if signals.s_evd >= t.evidence_gate_threshold
        || (clinvar_strong && signals.s_path >= t.pathway_alignment_threshold)
    {
        return EvidenceTier::Supported;
    }
    if signals.s_seq < t.insufficient_seq_floor
        && signals.s_path < t.insufficient_path_floor
        && signals.s_evd < t.insufficient_evd_floor
    {
        return EvidenceTier::Insufficient;
    }
    EvidenceTier::Consider
}

/// Badges in a fixed order.
pub fn compute_badges(
    path_pct: f64,
    evidence: Option<&EvidenceResult>,
    clinvar: Option<&ClinVarPrior>,
    fusion_active: bool,
    t: &ThresholdConfig,
) -> Vec<Badge> {
    let mut badges = Vec::new();
    if clinvar.is_some_and(ClinVarPrior::is_strong_pathogenic) {
        badges.push(Badge::ClinVarStrong);
    }
    if path_pct >= t.pathway_alignment_threshold {
        badges.push(Badge::PathwayAligned);
    }
    if let Some(ev) = evidence {
        if ev.filtered.iter().any(|c| c.has_publication_type("randomized controlled trial")) {
            badges.push(Badge::Rct);
        }
        if ev.filtered.iter().any(|c| c.has_publication_type("guideline")) {
            badges.push(Badge::Guideline);
        }
    }
    if fusion_active {
        badges.push(Badge::Fusion);
    }
    badges
}
