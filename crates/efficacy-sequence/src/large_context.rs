//! Large-context scorer: coarse magnitude scoring over long sequences.
//!
//! Synthetic mode builds strongly contrasting sequences around each allele.
//! Real-context mode fetches the reference window and substitutes the allele.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use efficacy_common::config::{LargeContextMode, ScorerConfig};
use efficacy_common::entities::ScoringStrategy;
use efficacy_common::provenance::ScorerKind;
use efficacy_common::{EfficacyError, Result, ScoringMode, SeqScore, Variant};

use crate::backend::EffectBackend;
use crate::calibration::{
    apply_hotspot_floor, apply_truncation_override, disruption_from_magnitude, impact_from_magnitude,
    percentile_for_level,
};
use crate::genome::{substitute_allele, GenomeWindowSource};
use crate::scorer::{ScoreOptions, SequenceScorer};

pub struct LargeContextScorer {
    backend: Arc<dyn EffectBackend>,
    genome: Option<Arc<dyn GenomeWindowSource>>,
    mode: LargeContextMode,
    synthetic_flank: usize,
    genome_flank: u64,
}

fn repeat_to(unit: &str, len: usize) -> String {
    unit.chars().cycle().take(len).collect()
}

impl LargeContextScorer {
    pub fn new(
        backend: Arc<dyn EffectBackend>,
        genome: Option<Arc<dyn GenomeWindowSource>>,
        cfg: &ScorerConfig,
    ) -> Self {
        Self {
            backend,
            genome,
            mode: cfg.large_context_mode,
            synthetic_flank: cfg.synthetic_flank as usize,
            genome_flank: u64::from(cfg.genome_flank),
        }
    }

    /// Reference context of `ACGT` repeats versus an alt context of `GC` repeats.
    pub fn synthetic_pair(variant: &Variant, flank: usize) -> (String, String) {
        let ref_ctx = repeat_to("ACGT", flank);
        let alt_ctx = repeat_to("GC", flank);
        let r = variant.ref_allele.to_uppercase();
        let a = variant.alt_allele.to_uppercase();
        (format!("{ref_ctx}{r}{ref_ctx}"), format!("{alt_ctx}{a}{alt_ctx}"))
    }

    /// `Ok(None)` when the reference allele does not match the fetched window.
    async fn genomic_pair(&self, genome: &dyn GenomeWindowSource, variant: &Variant) -> Result<Option<(String, String)>> {
        let start = variant.pos.saturating_sub(self.genome_flank).max(1);
        let end = variant.pos.checked_add(self.genome_flank).ok_or_else(|| {
            EfficacyError::InvalidVariant(format!("{}: window end overflows at position {}", variant.gene, variant.pos))
        })?;
        let window = genome
            .fetch_window(variant.assembly, variant.chrom_unprefixed(), start, end)
            .await?;
        let offset = variant.pos.saturating_sub(start) as usize;
        Ok(substitute_allele(&window, offset, &variant.ref_allele, &variant.alt_allele).map(|alt| (window, alt)))
    }

    async fn score_one(&self, variant: &Variant, model_id: &str) -> Option<SeqScore> {
        let (pair, mode) = match (self.mode, self.genome.as_deref()) {
            (LargeContextMode::RealContext, Some(genome)) => match self.genomic_pair(genome, variant).await {
                Ok(Some(pair)) => (pair, ScoringMode::LargeContextGenomic),
                Ok(None) => {
                    warn!(variant = %variant.key(), "Reference allele does not match genome window; skipping");
                    return None;
                }
                Err(e) => {
                    warn!(variant = %variant.key(), error = %e, "Genome window unavailable; skipping");
                    return None;
                }
            },
            _ => (
                Self::synthetic_pair(variant, self.synthetic_flank),
                ScoringMode::LargeContextSynthetic,
            ),
        };

        let delta = match self.backend.sequence_delta(model_id, &pair.0, &pair.1).await {
            Ok(Some(d)) => d,
            Ok(None) => return None,
            Err(e) => {
                warn!(variant = %variant.key(), error = %e, "Large-context delta failed");
                return None;
            }
        };

        let level = impact_from_magnitude(delta);
        let strategy = ScoringStrategy {
            models_tried: vec![model_id.to_string()],
            selected_model: Some(model_id.to_string()),
            ..Default::default()
        };
        let mut score = SeqScore::new(
            variant.clone(),
            disruption_from_magnitude(delta),
            percentile_for_level(level),
            level,
            mode,
        )
        .with_deltas(Some(delta), None)
        .with_strategy(strategy);
        apply_hotspot_floor(&mut score);
        apply_truncation_override(&mut score);
        Some(score)
    }
}

#[async_trait]
impl SequenceScorer for LargeContextScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::LargeContext
    }

    fn is_enabled(&self) -> bool {
        match self.mode {
            LargeContextMode::Synthetic => true,
            LargeContextMode::RealContext => self.genome.is_some(),
        }
    }

    fn serves_model(&self, model_id: &str) -> bool {
        self.backend.supports(model_id)
    }

    async fn score(&self, mutations: &[Variant], opts: &ScoreOptions) -> Vec<SeqScore> {
        if !self.backend.supports(&opts.model_id) {
            warn!(model_id = %opts.model_id, "Large-context scorer has no endpoint for model");
            return vec![];
        }
        let mut out = Vec::with_capacity(mutations.len());
        for variant in mutations {
            if let Some(score) = self.score_one(variant, &opts.model_id).await {
                out.push(score);
            }
        }
        info!(scored = out.len(), total = mutations.len(), mode = ?self.mode, "Large-context scoring complete");
        out
    }
}
