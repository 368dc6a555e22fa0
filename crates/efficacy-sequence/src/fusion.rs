use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use efficacy_common::entities::{Assembly, ScoringStrategy};
use efficacy_common::provenance::ScorerKind;
use efficacy_common::{ImpactLevel, ScoringMode, SeqScore, Variant};

use crate::calibration::{apply_hotspot_floor, apply_truncation_override, impact_from_percentile};
use crate::mechanistic::MechanisticBackend;
use crate::scorer::{ScoreOptions, SequenceScorer};

/// Primary scorer backed by the mechanistic-score service.
///
/// Only GRCh38 missense sets are eligible. A mutation whose every encoding
/// fails is skipped; zero placeholders are emitted only when no mutation in
/// the set scored.
pub struct FusionScorer {
    backend: Option<Arc<dyn MechanisticBackend>>,
}

impl FusionScorer {
    pub fn new(backend: Option<Arc<dyn MechanisticBackend>>) -> Self {
        Self { backend }
    }

    /// Candidate encodings in lookup order.
    pub fn encodings(variant: &Variant) -> Vec<String> {
        let chrom = variant.chrom_unprefixed();
        let (r, a) = (variant.ref_allele.to_uppercase(), variant.alt_allele.to_uppercase());
        let pos = variant.pos;
        vec![
            format!("chr{chrom}:{pos}:{r}:{a}"),
            format!("{chrom}:{pos}:{r}:{a}"),
            format!("chr{chrom}:{pos}:{a}:{r}"),
            format!("{chrom}:{pos}:{a}:{r}"),
        ]
    }

    async fn score_one(&self, backend: &dyn MechanisticBackend, variant: &Variant) -> Result<SeqScore, ScoringStrategy> {
        let mut strategy = ScoringStrategy::default();
        for encoding in Self::encodings(variant) {
            strategy.encodings_tried.push(encoding.clone());
            match backend.lookup(&encoding).await {
                Ok(Some(score)) => {
                    debug!(gene = %variant.gene, encoding = %encoding, score, "Fusion score found");
                    let mut s = SeqScore::new(
                        variant.clone(),
                        score,
                        score,
                        impact_from_percentile(score),
                        ScoringMode::Fusion,
                    )
                    .with_strategy(strategy);
                    apply_hotspot_floor(&mut s);
                    apply_truncation_override(&mut s);
                    return Ok(s);
                }
                Ok(None) => {}
                Err(e) => debug!(encoding = %encoding, error = %e, "Fusion lookup failed"),
            }
        }
        warn!(gene = %variant.gene, variant = %variant.key(), "No fusion score for any encoding; skipping");
        Err(strategy)
    }
}

#[async_trait]
impl SequenceScorer for FusionScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::Fusion
    }

    fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Not keyed by model id.
    fn serves_model(&self, _model_id: &str) -> bool {
        false
    }

    fn accepts(&self, mutations: &[Variant]) -> bool {
        !mutations.is_empty()
            && mutations
                .iter()
                .all(|v| v.assembly == Assembly::GRCh38 && v.is_missense())
    }

    async fn score(&self, mutations: &[Variant], _opts: &ScoreOptions) -> Vec<SeqScore> {
        let Some(backend) = self.backend.as_deref() else {
            return vec![];
        };
        let mut hits = Vec::with_capacity(mutations.len());
        let mut misses = Vec::new();
        for variant in mutations {
            match self.score_one(backend, variant).await {
                Ok(score) => hits.push(score),
                Err(strategy) => misses.push((variant, strategy)),
            }
        }
        info!(hits = hits.len(), total = mutations.len(), "Fusion scoring complete");
        if !hits.is_empty() {
            return hits;
        }
        misses
            .into_iter()
            .map(|(variant, strategy)| {
                SeqScore::new(variant.clone(), 0.0, 0.0, ImpactLevel::None, ScoringMode::FusionPlaceholder)
                    .with_strategy(strategy)
            })
            .collect()
    }
}
