//! Gene → pathway table and the Pathway Aggregator.
//!
//! Each SeqScore contributes `signal × weight` to every pathway its gene maps
//! to; contributions are averaged per pathway. Two policies shape the signal:
//!   - hotspot lift: curated hotspot genes with percentile ≥ threshold get
//!     `signal = max(raw, bound × percentile)`;
//!   - DDR gate: a missense variant with raw disruption below the gate adds
//!     nothing (and no count) to `ddr`.

use std::collections::BTreeMap;

use tracing::debug;

use efficacy_common::config::ThresholdConfig;
use efficacy_common::entities::clamp_unit;
use efficacy_common::{PathwayScoreMap, SeqScore};

pub const DDR: &str = "ddr";
pub const RAS_MAPK: &str = "ras_mapk";
pub const TP53: &str = "tp53";
pub const PI3K: &str = "pi3k";
pub const PGX_TOXICITY: &str = "pgx_toxicity";

/// Genes eligible for the hotspot lift.
pub const HOTSPOT_LIFT_GENES: &[&str] = &["TP53", "BRAF", "KRAS", "NRAS"];

/// Homologous-recombination repair genes.
pub const HRR_GENES: &[&str] = &["BRCA1", "BRCA2", "PALB2", "RAD51C", "RAD51D", "BRIP1", "BARD1", "ATM"];

const GENE_PATHWAYS: &[(&str, &[(&str, f64)])] = &[
    ("BRAF", &[(RAS_MAPK, 1.0)]),
    ("KRAS", &[(RAS_MAPK, 1.0)]),
    ("NRAS", &[(RAS_MAPK, 1.0)]),
    ("HRAS", &[(RAS_MAPK, 0.9)]),
    ("MAP2K1", &[(RAS_MAPK, 0.9)]),
    ("NF1", &[(RAS_MAPK, 0.7)]),
    ("TP53", &[(TP53, 1.0)]),
    ("MDM2", &[(TP53, 0.8)]),
    ("BRCA1", &[(DDR, 1.0)]),
    ("BRCA2", &[(DDR, 1.0)]),
    ("PALB2", &[(DDR, 0.9)]),
    ("RAD51C", &[(DDR, 0.9)]),
    ("RAD51D", &[(DDR, 0.9)]),
    ("BRIP1", &[(DDR, 0.8)]),
    ("BARD1", &[(DDR, 0.8)]),
    ("ATM", &[(DDR, 0.9)]),
    ("ATR", &[(DDR, 0.8)]),
    ("CHEK2", &[(DDR, 0.7)]),
    ("ARID1A", &[(DDR, 0.6)]),
    ("PIK3CA", &[(PI3K, 1.0)]),
    ("PTEN", &[(PI3K, 0.9)]),
    ("AKT1", &[(PI3K, 0.9)]),
    ("TPMT", &[(PGX_TOXICITY, 1.0)]),
    ("NUDT15", &[(PGX_TOXICITY, 1.0)]),
    ("DPYD", &[(PGX_TOXICITY, 1.0)]),
    ("UGT1A1", &[(PGX_TOXICITY, 0.8)]),
    ("CYP2D6", &[(PGX_TOXICITY, 0.8)]),
];

/// Pathway weights for `gene` (case-insensitive). Unknown genes map nowhere.
pub fn gene_pathways(gene: &str) -> &'static [(&'static str, f64)] {
    let gene = gene.trim().to_uppercase();
    GENE_PATHWAYS
        .iter()
        .find(|(g, _)| *g == gene)
        .map(|(_, w)| *w)
        .unwrap_or(&[])
}

pub fn is_hrr_gene(gene: &str) -> bool {
    HRR_GENES.contains(&gene.trim().to_uppercase().as_str())
}

pub struct PathwayAggregator {
    ddr_gate: f64,
    hotspot_percentile: f64,
    hotspot_bound: f64,
}

impl PathwayAggregator {
    pub fn new(thresholds: &ThresholdConfig) -> Self {
        Self {
            ddr_gate: thresholds.ddr_missense_gate,
            hotspot_percentile: thresholds.hotspot_percentile,
            hotspot_bound: thresholds.hotspot_lift_bound,
        }
    }

    /// Signal a score contributes before pathway weighting.
    pub fn signal(&self, score: &SeqScore) -> f64 {
        let raw = score.sequence_disruption;
        let gene = score.variant.gene_upper();
        if HOTSPOT_LIFT_GENES.contains(&gene.as_str()) && score.calibrated_percentile >= self.hotspot_percentile {
            raw.max(self.hotspot_bound * score.calibrated_percentile)
        } else {
            raw
        }
    }

    fn ddr_gated(&self, score: &SeqScore) -> bool {
        score.variant.is_missense() && score.sequence_disruption < self.ddr_gate
    }

    pub fn aggregate(&self, scores: &[SeqScore]) -> PathwayScoreMap {
        let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
        for score in scores {
            let signal = self.signal(score);
            for &(pathway, weight) in gene_pathways(&score.variant.gene) {
                let slot = sums.entry(pathway.to_string()).or_insert((0.0, 0));
                if pathway == DDR && self.ddr_gated(score) {
                    debug!(gene = %score.variant.gene, raw = score.sequence_disruption, "DDR contribution gated");
                    continue;
                }
                slot.0 += signal * weight;
                slot.1 += 1;
            }
        }
        sums.into_iter()
            .map(|(pathway, (sum, count))| {
                let value = if count == 0 { 0.0 } else { sum / f64::from(count) };
                (pathway, clamp_unit(value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use efficacy_common::{ImpactLevel, ScoringMode, Variant};

    fn score(variant: Variant, raw: f64, pct: f64) -> SeqScore {
        SeqScore::new(variant, raw, pct, ImpactLevel::Minor, ScoringMode::AdaptiveEnsemble)
    }

    fn aggregator() -> PathwayAggregator {
        PathwayAggregator::new(&ThresholdConfig::default())
    }

    #[test]
    fn test_ddr_gate_drops_benign_missense() {
        let v = Variant::new("BRCA1", "17", 43045712, "A", "G").with_consequence("missense_variant");
        let map = aggregator().aggregate(&[score(v, 0.01, 0.1)]);
        assert_eq!(map.get(DDR).copied().unwrap_or(0.0), 0.0);
    }

    #[test]
    fn test_ddr_gate_ignores_truncating() {
        let v = Variant::new("BRCA1", "17", 43045712, "A", "G").with_consequence("stop_gained");
        let map = aggregator().aggregate(&[score(v, 0.01, 0.1)]);
        assert!((map[DDR] - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_hotspot_lift_bounded() {
        let v = Variant::new("TP53", "17", 7675088, "C", "T").with_hgvs_p("p.R175H");
        let map = aggregator().aggregate(&[score(v, 0.01, 0.9)]);
        assert!(map[TP53] >= 0.5 * 0.9 * 1.0 - 1e-12);
        assert!(map[TP53] < 0.46);
    }

    #[test]
    fn test_no_lift_below_percentile_or_outside_set() {
        let v = Variant::new("TP53", "17", 1, "C", "T");
        assert_eq!(aggregator().signal(&score(v, 0.01, 0.6)), 0.01);
        let v = Variant::new("PIK3CA", "3", 1, "A", "G");
        assert_eq!(aggregator().signal(&score(v, 0.01, 0.95)), 0.01);
    }

    #[test]
    fn test_average_by_count() {
        let a = Variant::new("KRAS", "12", 1, "C", "T");
        let b = Variant::new("BRAF", "7", 2, "T", "A");
        let map = aggregator().aggregate(&[score(a, 0.2, 0.5), score(b, 0.4, 0.5)]);
        assert!((map[RAS_MAPK] - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_pgx_gene_maps_to_toxicity() {
        let v = Variant::new("TPMT", "6", 18130918, "C", "T").with_hgvs_p("p.A154T");
        let map = aggregator().aggregate(&[score(v, 0.3, 0.8)]);
        assert!(map[PGX_TOXICITY] > 0.0);
        assert!(gene_pathways("unknown").is_empty());
    }
}
