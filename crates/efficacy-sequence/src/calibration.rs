//! Raw model delta → percentile / impact calibration, plus the fixed
//! post-hoc policies applied after any model scoring.

use efficacy_common::entities::{clamp_unit, ImpactLevel, SeqScore, Variant};

/// Percentile floor for curated hotspot codons.
pub const HOTSPOT_PERCENTILE_FLOOR: f64 = 0.90;
/// Raw disruption floor for curated hotspot codons.
pub const HOTSPOT_DISRUPTION_FLOOR: f64 = 1e-4;

/// Gene → codons treated as known hotspots.
const HOTSPOT_CODONS: &[(&str, &[u32])] = &[
    ("BRAF", &[600]),
    ("KRAS", &[12, 13, 61]),
    ("NRAS", &[12, 13, 61]),
    ("HRAS", &[12, 13, 61]),
    ("TP53", &[175, 248, 273]),
];

/// Piecewise percentile for an absolute model delta.
pub fn percentile_like(abs_delta: f64) -> f64 {
    let d = abs_delta.abs();
    if d.is_nan() {
        0.0
    } else if d <= 0.005 {
        0.05
    } else if d <= 0.01 {
        0.10
    } else if d <= 0.02 {
        0.20
    } else if d <= 0.05 {
        0.50
    } else if d <= 0.10 {
        0.80
    } else {
        1.0
    }
}

/// Impact bucket for a model-delta percentile.
pub fn impact_from_percentile(percentile: f64) -> ImpactLevel {
    if percentile >= 1.0 {
        ImpactLevel::Major
    } else if percentile >= 0.5 {
        ImpactLevel::Moderate
    } else if percentile >= 0.2 {
        ImpactLevel::Minor
    } else {
        ImpactLevel::None
    }
}

// ── Large-context magnitude buckets ──────────────────────────────────────────

pub const MAGNITUDE_CATASTROPHIC: f64 = 20_000.0;
pub const MAGNITUDE_MAJOR: f64 = 10_000.0;
pub const MAGNITUDE_MODERATE: f64 = 1_000.0;
pub const MAGNITUDE_MINOR: f64 = 100.0;

pub fn impact_from_magnitude(magnitude: f64) -> ImpactLevel {
    let m = magnitude.abs();
    if m >= MAGNITUDE_CATASTROPHIC {
        ImpactLevel::Catastrophic
    } else if m >= MAGNITUDE_MAJOR {
        ImpactLevel::Major
    } else if m >= MAGNITUDE_MODERATE {
        ImpactLevel::Moderate
    } else if m >= MAGNITUDE_MINOR {
        ImpactLevel::Minor
    } else {
        ImpactLevel::None
    }
}

/// Disruption for a large-context magnitude, saturating at the catastrophic bound.
pub fn disruption_from_magnitude(magnitude: f64) -> f64 {
    clamp_unit(magnitude.abs() / MAGNITUDE_CATASTROPHIC)
}

pub fn percentile_for_level(level: ImpactLevel) -> f64 {
    match level {
        ImpactLevel::Catastrophic => 1.0,
        ImpactLevel::Major => 0.9,
        ImpactLevel::Moderate => 0.6,
        ImpactLevel::Minor => 0.3,
        ImpactLevel::None => 0.05,
    }
}

// ── Post-hoc policies ────────────────────────────────────────────────────────

/// Protein codon number from `p.V600E`, `p.Val600Glu`, `V600E`, `p.(G12D)`.
pub fn protein_codon(hgvs_p: &str) -> Option<u32> {
    let s = hgvs_p.trim();
    let s = s.strip_prefix("p.").unwrap_or(s);
    let s = s.trim_start_matches('(');
    let digits: String = s
        .chars()
        .skip_while(|c| c.is_ascii_alphabetic())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

pub fn is_known_hotspot(variant: &Variant) -> bool {
    let Some(codon) = variant.hgvs_p.as_deref().and_then(protein_codon) else {
        return false;
    };
    let gene = variant.gene_upper();
    HOTSPOT_CODONS
        .iter()
        .any(|(g, codons)| *g == gene && codons.contains(&codon))
}

/// Raise percentile (and a token raw disruption) for curated hotspot codons.
pub fn apply_hotspot_floor(score: &mut SeqScore) {
    if !is_known_hotspot(&score.variant) {
        return;
    }
    if score.calibrated_percentile < HOTSPOT_PERCENTILE_FLOOR {
        score.calibrated_percentile = HOTSPOT_PERCENTILE_FLOOR;
        score.scoring_strategy.hotspot_floor = true;
    }
    score.sequence_disruption = score.sequence_disruption.max(HOTSPOT_DISRUPTION_FLOOR);
    score.impact_level = score.impact_level.max(impact_from_percentile(score.calibrated_percentile));
}

/// Premature stops and frameshifts are maximal disruption regardless of model signal.
pub fn apply_truncation_override(score: &mut SeqScore) {
    if !score.variant.is_truncating() {
        return;
    }
    score.sequence_disruption = 1.0;
    score.calibrated_percentile = 1.0;
    score.impact_level = ImpactLevel::Catastrophic;
    score.scoring_strategy.truncation_override = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use efficacy_common::entities::ScoringMode;

    #[test]
    fn test_percentile_boundaries() {
        assert_eq!(percentile_like(0.005), 0.05);
        assert_eq!(percentile_like(0.0051), 0.10);
        assert_eq!(percentile_like(-0.015), 0.20);
        assert_eq!(percentile_like(0.05), 0.50);
        assert_eq!(percentile_like(0.07), 0.80);
        assert_eq!(percentile_like(0.5), 1.0);
    }

    #[test]
    fn test_magnitude_buckets() {
        assert_eq!(impact_from_magnitude(25_000.0), ImpactLevel::Catastrophic);
        assert_eq!(impact_from_magnitude(-10_000.0), ImpactLevel::Major);
        assert_eq!(impact_from_magnitude(1_000.0), ImpactLevel::Moderate);
        assert_eq!(impact_from_magnitude(150.0), ImpactLevel::Minor);
        assert_eq!(impact_from_magnitude(99.9), ImpactLevel::None);
        assert_eq!(disruption_from_magnitude(40_000.0), 1.0);
        assert_eq!(disruption_from_magnitude(10_000.0), 0.5);
    }

    #[test]
    fn test_protein_codon() {
        assert_eq!(protein_codon("p.V600E"), Some(600));
        assert_eq!(protein_codon("p.Gly12Asp"), Some(12));
        assert_eq!(protein_codon("p.(R273H)"), Some(273));
        assert_eq!(protein_codon("c.1799T>A"), None);
    }

    #[test]
    fn test_hotspot_floor() {
        let v = Variant::new("TP53", "17", 7675088, "C", "T").with_hgvs_p("p.R175H");
        let mut s = SeqScore::new(v, 0.0, 0.05, ImpactLevel::None, ScoringMode::AdaptiveEnsemble);
        apply_hotspot_floor(&mut s);
        assert_eq!(s.calibrated_percentile, HOTSPOT_PERCENTILE_FLOOR);
        assert_eq!(s.sequence_disruption, HOTSPOT_DISRUPTION_FLOOR);
        assert!(s.scoring_strategy.hotspot_floor);

        let v = Variant::new("TP53", "17", 1, "C", "T").with_hgvs_p("p.R176H");
        let mut s = SeqScore::new(v, 0.0, 0.05, ImpactLevel::None, ScoringMode::AdaptiveEnsemble);
        apply_hotspot_floor(&mut s);
        assert_eq!(s.calibrated_percentile, 0.05);
    }

    #[test]
    fn test_truncation_override() {
        let v = Variant::new("BRCA2", "13", 1, "C", "T").with_hgvs_p("p.E1000*");
        let mut s = SeqScore::new(v, 0.001, 0.05, ImpactLevel::None, ScoringMode::AdaptiveEnsemble);
        apply_truncation_override(&mut s);
        assert_eq!(s.sequence_disruption, 1.0);
        assert_eq!(s.calibrated_percentile, 1.0);
        assert_eq!(s.impact_level, ImpactLevel::Catastrophic);
    }
}
