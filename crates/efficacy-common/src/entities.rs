/// Core entity types flowing through one efficacy prediction.
/// Everything here is created, mutated, and discarded within a single request.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EfficacyError, Result};

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Assembly {
    #[serde(rename = "GRCh37", alias = "hg19", alias = "grch37")]
    GRCh37,
    #[default]
    #[serde(rename = "GRCh38", alias = "hg38", alias = "grch38")]
    GRCh38,
}

impl Assembly {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GRCh37 => "GRCh37",
            Self::GRCh38 => "GRCh38",
        }
    }
}

/// Largest accepted 1-based position; above the longest human chromosome.
pub const MAX_POSITION: u64 = 300_000_000;

/// A single genomic variant as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub gene: String,
    pub chrom: String,
    pub pos: u64,
    #[serde(rename = "ref")]
    pub ref_allele: String,
    #[serde(rename = "alt")]
    pub alt_allele: String,
    #[serde(default)]
    pub hgvs_p: Option<String>, // e.g. p.V600E
    #[serde(default)]
    pub hgvs_c: Option<String>, // e.g. c.1799T>A
    #[serde(default)]
    pub consequence: Option<String>, // e.g. missense_variant
    #[serde(default)]
    pub assembly: Assembly,
}

impl Variant {
    pub fn new(
        gene: impl Into<String>,
        chrom: impl Into<String>,
        pos: u64,
        ref_allele: impl Into<String>,
        alt_allele: impl Into<String>,
    ) -> Self {
        Self {
            gene: gene.into(),
            chrom: chrom.into(),
            pos,
            ref_allele: ref_allele.into(),
            alt_allele: alt_allele.into(),
            hgvs_p: None,
            hgvs_c: None,
            consequence: None,
            assembly: Assembly::GRCh38,
        }
    }

    pub fn with_hgvs_p(mut self, hgvs_p: impl Into<String>) -> Self {
        self.hgvs_p = Some(hgvs_p.into());
        self
    }

    pub fn with_consequence(mut self, consequence: impl Into<String>) -> Self {
        self.consequence = Some(consequence.into());
        self
    }

    pub fn with_assembly(mut self, assembly: Assembly) -> Self {
        self.assembly = assembly;
        self
    }

    /// Reject variants missing the coordinates every backend needs, or placed
    /// beyond [`MAX_POSITION`].
    pub fn validate(&self) -> Result<()> {
        if self.gene.trim().is_empty() {
            return Err(EfficacyError::InvalidVariant("missing gene symbol".into()));
        }
        if self.chrom_unprefixed().is_empty() {
            return Err(EfficacyError::InvalidVariant(format!("{}: missing chromosome", self.gene)));
        }
        if self.pos == 0 {
            return Err(EfficacyError::InvalidVariant(format!("{}: position must be >= 1", self.gene)));
        }
        if self.pos > MAX_POSITION {
            return Err(EfficacyError::InvalidVariant(format!(
                "{}: position {} exceeds {MAX_POSITION}",
                self.gene, self.pos
            )));
        }
        for allele in [&self.ref_allele, &self.alt_allele] {
            if allele.is_empty() || !allele.chars().all(|c| matches!(c.to_ascii_uppercase(), 'A' | 'C' | 'G' | 'T' | 'N')) {
                return Err(EfficacyError::InvalidVariant(format!(
                    "{}: allele {allele:?} is not a nucleotide string",
                    self.gene
                )));
            }
        }
        Ok(())
    }

    /// Chromosome without a leading `chr`.
    pub fn chrom_unprefixed(&self) -> &str {
        let c = self.chrom.trim();
        c.strip_prefix("chr")
            .or_else(|| c.strip_prefix("CHR"))
            .unwrap_or(c)
    }

    pub fn gene_upper(&self) -> String {
        self.gene.trim().to_uppercase()
    }

    /// Stable identity used in cache keys and logs: `7:140453136:T>A`.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}>{}",
            self.chrom_unprefixed(),
            self.pos,
            self.ref_allele.to_uppercase(),
            self.alt_allele.to_uppercase()
        )
    }

    pub fn is_missense(&self) -> bool {
        if let Some(c) = &self.consequence {
            return c.to_lowercase().contains("missense");
        }
        // Fall back to protein notation when no consequence tag is present
        match &self.hgvs_p {
            Some(p) => !protein_is_truncating(p) && !p.contains('=') && p.len() > 3,
            None => false,
        }
    }

    /// Premature stop or frameshift, from consequence tag or protein notation.
    pub fn is_truncating(&self) -> bool {
        if let Some(c) = &self.consequence {
            let c = c.to_lowercase();
            if c.contains("stop_gained") || c.contains("frameshift") || c.contains("nonsense") {
                return true;
            }
        }
        self.hgvs_p.as_deref().is_some_and(protein_is_truncating)
    }
}

fn protein_is_truncating(hgvs_p: &str) -> bool {
    let p = hgvs_p.trim();
    p.contains('*') || p.contains("Ter") || p.contains("fs")
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hgvs_p {
            Some(p) => write!(f, "{} {} ({})", self.gene, p, self.key()),
            None => write!(f, "{} {}", self.gene, self.key()),
        }
    }
}

// ---------------------------------------------------------------------------
// Sequence scores
// ---------------------------------------------------------------------------

/// Ordinal impact bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    None,
    Minor,
    Moderate,
    Major,
    Catastrophic,
}

/// Which scorer (and path within it) produced a [`SeqScore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    Fusion,
    /// Fusion was eligible but every lookup failed.
    FusionPlaceholder,
    AdaptiveEnsemble,
    LargeContextSynthetic,
    LargeContextGenomic,
}

impl ScoringMode {
    pub fn is_fusion(&self) -> bool {
        matches!(self, Self::Fusion | Self::FusionPlaceholder)
    }
}

/// One flank tried by the adaptive ensemble scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowAttempt {
    pub model_id: String,
    pub flank: u32,
    /// The model's multi-window delta. It is requested once per model and not
    /// per flank, so every attempt for the same model repeats this value.
    pub min_delta: Option<f64>,
    pub exon_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Provenance of how a single [`SeqScore`] was obtained.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoringStrategy {
    #[serde(default)]
    pub models_tried: Vec<String>,
    #[serde(default)]
    pub windows_tested: Vec<WindowAttempt>,
    #[serde(default)]
    pub encodings_tried: Vec<String>,
    pub selected_model: Option<String>,
    pub selected_flank: Option<u32>,
    #[serde(default)]
    pub symmetry: bool,
    #[serde(default)]
    pub delta_only: bool,
    #[serde(default)]
    pub truncation_override: bool,
    #[serde(default)]
    pub hotspot_floor: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeqScore {
    pub variant: Variant,
    pub sequence_disruption: f64,
    pub min_delta: Option<f64>,
    pub exon_delta: Option<f64>,
    pub calibrated_percentile: f64,
    pub impact_level: ImpactLevel,
    pub scoring_mode: ScoringMode,
    pub scoring_strategy: ScoringStrategy,
}

impl SeqScore {
    /// Build a score, clamping disruption and percentile to [0, 1].
    pub fn new(
        variant: Variant,
        sequence_disruption: f64,
        calibrated_percentile: f64,
        impact_level: ImpactLevel,
        scoring_mode: ScoringMode,
    ) -> Self {
        Self {
            variant,
            sequence_disruption: clamp_unit(sequence_disruption),
            min_delta: None,
            exon_delta: None,
            calibrated_percentile: clamp_unit(calibrated_percentile),
            impact_level,
            scoring_mode,
            scoring_strategy: ScoringStrategy::default(),
        }
    }

    pub fn with_deltas(mut self, min_delta: Option<f64>, exon_delta: Option<f64>) -> Self {
        self.min_delta = min_delta;
        self.exon_delta = exon_delta;
        self
    }

    pub fn with_strategy(mut self, strategy: ScoringStrategy) -> Self {
        self.scoring_strategy = strategy;
        self
    }
}

/// Clamp to [0, 1], mapping NaN to 0.
pub fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Pathway name → aggregated score in [0, 1]. Built fresh per request.
pub type PathwayScoreMap = BTreeMap<String, f64>;

// ---------------------------------------------------------------------------
// Drug panel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugConfig {
    pub name: String,
    pub moa: String,
    pub pathway_weights: BTreeMap<String, f64>,
    /// Genes whose alteration this drug directly targets (MoA match bonus).
    #[serde(default)]
    pub target_genes: Vec<String>,
    /// Coarse class label (e.g. `parp`, `atr`, `platinum`) used by gene-family
    /// bumps and treatment-line modulation.
    #[serde(default)]
    pub drug_class: Option<String>,
}

impl DrugConfig {
    pub fn new(name: &str, moa: &str, weights: &[(&str, f64)]) -> Self {
        Self {
            name: name.to_string(),
            moa: moa.to_string(),
            pathway_weights: weights.iter().map(|(p, w)| (p.to_string(), *w)).collect(),
            target_genes: vec![],
            drug_class: None,
        }
    }

    pub fn with_targets(mut self, genes: &[&str]) -> Self {
        self.target_genes = genes.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.drug_class = Some(class.to_string());
        self
    }

    pub fn class_is(&self, class: &str) -> bool {
        self.drug_class.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(class))
    }
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Citation {
    pub pmid: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub publication_types: Vec<String>,
    pub year: Option<i32>,
}

impl Citation {
    pub fn has_publication_type(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.publication_types.iter().any(|t| t.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvidenceResult {
    pub strength: f64,
    #[serde(default)]
    pub filtered: Vec<Citation>,
    #[serde(default)]
    pub raw: Vec<Citation>,
    #[serde(default)]
    pub query: String,
}

impl EvidenceResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClinVarClassification {
    Pathogenic,
    LikelyPathogenic,
    Uncertain,
    LikelyBenign,
    Benign,
    Conflicting,
    #[default]
    NotFound,
}

impl ClinVarClassification {
    pub fn is_pathogenic(&self) -> bool {
        matches!(self, Self::Pathogenic | Self::LikelyPathogenic)
    }

    /// Parse the free-text classification ClinVar returns.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim().to_lowercase().replace(['_', '-'], " ");
        if s.contains("conflicting") {
            Self::Conflicting
        } else if s.contains("likely pathogenic") {
            Self::LikelyPathogenic
        } else if s.contains("pathogenic") {
            Self::Pathogenic
        } else if s.contains("likely benign") {
            Self::LikelyBenign
        } else if s.contains("benign") {
            Self::Benign
        } else if s.contains("uncertain") || s.contains("vus") {
            Self::Uncertain
        } else {
            Self::NotFound
        }
    }
}

pub const CLINVAR_PRIOR_BOUND: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClinVarPrior {
    pub classification: ClinVarClassification,
    #[serde(default)]
    pub review_status: String,
    /// Signed adjustment in [-0.2, 0.2].
    pub prior: f64,
}

impl ClinVarPrior {
    pub fn new(classification: ClinVarClassification, review_status: impl Into<String>, prior: f64) -> Self {
        let prior = if prior.is_nan() { 0.0 } else { prior };
        Self {
            classification,
            review_status: review_status.into(),
            prior: prior.clamp(-CLINVAR_PRIOR_BOUND, CLINVAR_PRIOR_BOUND),
        }
    }

    /// Expert panel, practice guideline, or multi-submitter consensus.
    pub fn is_strong_review(&self) -> bool {
        let r = self.review_status.to_lowercase();
        r.contains("expert panel")
            || r.contains("practice guideline")
            || (r.contains("multiple submitters") && r.contains("no conflicts"))
    }

    pub fn is_strong_pathogenic(&self) -> bool {
        self.classification.is_pathogenic() && self.is_strong_review()
    }
}

/// Functional insight bundle for the primary variant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InsightScores {
    pub functionality: Option<f64>,
    pub chromatin: Option<f64>,
    pub essentiality: Option<f64>,
    pub regulatory: Option<f64>,
}

// ---------------------------------------------------------------------------
// Drug scoring output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceTier {
    Supported,
    Consider,
    Insufficient,
}

impl EvidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supported => "supported",
            Self::Consider => "consider",
            Self::Insufficient => "insufficient",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Badge {
    #[serde(rename = "ClinVar-Strong")]
    ClinVarStrong,
    #[serde(rename = "PathwayAligned")]
    PathwayAligned,
    #[serde(rename = "RCT")]
    Rct,
    #[serde(rename = "Guideline")]
    Guideline,
    #[serde(rename = "Fusion")]
    Fusion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    InsightLift,
    ClinvarAlignment,
    MoaMatch,
    DdrOnlyPenalty,
    HrrParpBump,
    Arid1aAtrBump,
    CohortLift,
    CrossResistance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAdjustment {
    pub kind: AdjustmentKind,
    pub amount: f64,
}

/// Per-signal contributions behind a drug's score.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Rationale {
    pub s_seq: f64,
    pub seq_percentile: f64,
    pub s_path: f64,
    pub path_percentile: f64,
    pub s_evd: f64,
    pub clinvar_prior: f64,
    #[serde(default)]
    pub adjustments: Vec<ConfidenceAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugScoreResult {
    pub name: String,
    pub moa: String,
    pub efficacy_score: f64,
    pub confidence: f64,
    pub evidence_tier: EvidenceTier,
    pub badges: Vec<Badge>,
    pub citations: Vec<Citation>,
    pub clinvar: Option<ClinVarPrior>,
    pub rationale: Rationale,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<InsightScores>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_percentile: Option<f64>,
}

impl DrugScoreResult {
    pub fn has_badge(&self, badge: Badge) -> bool {
        self.badges.contains(&badge)
    }

    /// Add a post-processing adjustment to confidence, clamped to [0, 1].
    pub fn apply_adjustment(&mut self, kind: AdjustmentKind, amount: f64) {
        self.confidence = clamp_unit(self.confidence + amount);
        self.rationale.adjustments.push(ConfidenceAdjustment { kind, amount });
    }
}

// ---------------------------------------------------------------------------
// Optional post-processing payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaeFeature {
    pub index: u32,
    pub activation: f64,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaeFeatureSet {
    pub variant: String,
    pub features: Vec<SaeFeature>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn braf() -> Variant {
        Variant::new("BRAF", "7", 140453136, "T", "A").with_hgvs_p("p.V600E")
    }

    #[test]
    fn test_variant_validate() {
        assert!(braf().validate().is_ok());
        let mut v = braf();
        v.pos = 0;
        assert!(matches!(v.validate(), Err(EfficacyError::InvalidVariant(_))));
        let mut v = braf();
        v.alt_allele = "".into();
        assert!(v.validate().is_err());
        let mut v = braf();
        v.chrom = "chr".into();
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_variant_validate_position_bound() {
        let mut v = braf();
        v.pos = MAX_POSITION;
        assert!(v.validate().is_ok());
        v.pos = MAX_POSITION + 1;
        assert!(matches!(v.validate(), Err(EfficacyError::InvalidVariant(_))));
        v.pos = u64::MAX;
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_variant_key_strips_prefix() {
        let mut v = braf();
        v.chrom = "chr7".into();
        assert_eq!(v.key(), "7:140453136:T>A");
    }

    #[test]
    fn test_truncation_detection() {
        assert!(Variant::new("TP53", "17", 1, "C", "T").with_hgvs_p("p.R196*").is_truncating());
        assert!(Variant::new("BRCA1", "17", 1, "C", "T").with_hgvs_p("p.E23fs").is_truncating());
        assert!(Variant::new("BRCA2", "13", 1, "C", "T").with_consequence("stop_gained").is_truncating());
        assert!(!braf().is_truncating());
    }

    #[test]
    fn test_missense_detection() {
        assert!(braf().is_missense());
        assert!(Variant::new("X", "1", 1, "A", "G").with_consequence("missense_variant").is_missense());
        assert!(!Variant::new("X", "1", 1, "A", "G").is_missense());
    }

    #[test]
    fn test_seq_score_clamps() {
        let s = SeqScore::new(braf(), 3.5, -0.2, ImpactLevel::Major, ScoringMode::AdaptiveEnsemble);
        assert_eq!(s.sequence_disruption, 1.0);
        assert_eq!(s.calibrated_percentile, 0.0);
        let s = SeqScore::new(braf(), f64::NAN, 0.4, ImpactLevel::Minor, ScoringMode::Fusion);
        assert_eq!(s.sequence_disruption, 0.0);
    }

    #[test]
    fn test_clinvar_prior_bounded() {
        let p = ClinVarPrior::new(ClinVarClassification::Pathogenic, "reviewed by expert panel", 0.9);
        assert_eq!(p.prior, 0.2);
        assert!(p.is_strong_pathogenic());
        let p = ClinVarPrior::new(ClinVarClassification::Benign, "single submitter", -0.5);
        assert_eq!(p.prior, -0.2);
        assert!(!p.is_strong_review());
    }

    #[test]
    fn test_clinvar_classification_parse() {
        assert_eq!(ClinVarClassification::parse("Likely_pathogenic"), ClinVarClassification::LikelyPathogenic);
        assert_eq!(ClinVarClassification::parse("Pathogenic"), ClinVarClassification::Pathogenic);
        assert_eq!(
            ClinVarClassification::parse("Conflicting interpretations of pathogenicity"),
            ClinVarClassification::Conflicting
        );
        assert_eq!(ClinVarClassification::parse("Uncertain significance"), ClinVarClassification::Uncertain);
        assert_eq!(ClinVarClassification::parse(""), ClinVarClassification::NotFound);
    }

    #[test]
    fn test_badge_serialization() {
        let json = serde_json::to_string(&vec![Badge::ClinVarStrong, Badge::Rct]).unwrap();
        assert_eq!(json, r#"["ClinVar-Strong","RCT"]"#);
    }

    #[test]
    fn test_variant_json_uses_ref_alt() {
        let v: Variant = serde_json::from_str(
            r#"{"gene":"BRAF","chrom":"7","pos":140453136,"ref":"T","alt":"A","hgvs_p":"p.V600E"}"#,
        )
        .unwrap();
        assert_eq!(v.ref_allele, "T");
        assert_eq!(v.assembly, Assembly::GRCh38);
    }
}
