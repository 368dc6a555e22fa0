//! Adaptive-window ensemble scorer.
//!
//! Per mutation: for each candidate model (capped), request the multi-window
//! delta once and an exon-window delta per flank (capped). The exon delta with
//! the largest magnitude represents the model; across models the largest
//! |exon| (else |multi|) wins, ties going to the earlier model.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use efficacy_common::config::ScorerConfig;
use efficacy_common::entities::{ScoringStrategy, WindowAttempt};
use efficacy_common::provenance::ScorerKind;
use efficacy_common::{Result, ScoringMode, SeqScore, Variant};

use crate::backend::{DeltaRequest, DeltaWindow, EffectBackend};
use crate::calibration::{
    apply_hotspot_floor, apply_truncation_override, impact_from_percentile, percentile_like,
};
use crate::scorer::{ScoreOptions, SequenceScorer};

/// Best deltas one model produced for one mutation.
#[derive(Debug, Clone)]
struct ModelResult {
    model_id: String,
    min_delta: Option<f64>,
    exon_delta: Option<f64>,
    flank: Option<u32>,
}

impl ModelResult {
    /// Magnitude used for cross-model selection.
    fn selection_magnitude(&self) -> Option<f64> {
        self.exon_delta.or(self.min_delta).map(f64::abs)
    }
}

pub struct AdaptiveEnsembleScorer {
    backend: Arc<dyn EffectBackend>,
    ensemble_models: Vec<String>,
    flanks: Vec<u32>,
    max_models: usize,
    max_flanks: usize,
}

impl AdaptiveEnsembleScorer {
    pub fn new(backend: Arc<dyn EffectBackend>, cfg: &ScorerConfig) -> Self {
        Self {
            backend,
            ensemble_models: cfg.ensemble_models.clone(),
            flanks: cfg.flanks.clone(),
            max_models: cfg.max_models.max(1),
            max_flanks: cfg.max_flanks.max(1),
        }
    }

    /// Requested model first, then configured ensemble members, deduplicated,
    /// limited to models with an endpoint, capped.
    pub fn candidate_models(&self, opts: &ScoreOptions) -> Vec<String> {
        if !opts.ensemble {
            return if self.backend.supports(&opts.model_id) {
                vec![opts.model_id.clone()]
            } else {
                vec![]
            };
        }
        let mut out: Vec<String> = Vec::new();
        for m in std::iter::once(&opts.model_id).chain(self.ensemble_models.iter()) {
            if !out.contains(m) && self.backend.supports(m) {
                out.push(m.clone());
            }
        }
        out.truncate(self.max_models);
        out
    }

    pub fn candidate_flanks(&self, opts: &ScoreOptions) -> Vec<u32> {
        let take = if opts.adaptive { self.max_flanks } else { 1 };
        self.flanks.iter().copied().take(take).collect()
    }

    /// Forward delta, or the forward/reverse average under symmetry.
    async fn directional_delta(&self, req: &DeltaRequest, symmetry: bool) -> Result<Option<f64>> {
        let forward = self.backend.variant_delta(req).await?;
        if !symmetry {
            return Ok(forward);
        }
        let Some(fwd) = forward else {
            return Ok(None);
        };
        match self.backend.variant_delta(&req.reversed()).await {
            Ok(Some(rev)) => Ok(Some((fwd - rev) / 2.0)),
            Ok(None) => Ok(Some(fwd)),
            Err(e) => {
                debug!(error = %e, "Reverse direction failed; using forward delta");
                Ok(Some(fwd))
            }
        }
    }

    async fn score_with_model(
        &self,
        variant: &Variant,
        model_id: &str,
        flanks: &[u32],
        opts: &ScoreOptions,
        attempts: &mut Vec<WindowAttempt>,
    ) -> Option<ModelResult> {
        let multi_req = DeltaRequest::for_variant(variant, model_id, DeltaWindow::MultiWindow);
        let min_delta = match self.directional_delta(&multi_req, opts.symmetry).await {
            Ok(d) => d,
            Err(e) => {
                warn!(model_id, variant = %variant.key(), error = %e, "Multi-window delta failed");
                None
            }
        };

        let mut best_exon: Option<(f64, u32)> = None;
        if !opts.delta_only {
            for &flank in flanks {
                let req = DeltaRequest::for_variant(variant, model_id, DeltaWindow::Exon { flank });
                let (exon, error) = match self.directional_delta(&req, opts.symmetry).await {
                    Ok(d) => (d, None),
                    Err(e) => (None, Some(e.to_string())),
                };
                attempts.push(WindowAttempt {
                    model_id: model_id.to_string(),
                    flank,
                    min_delta,
                    exon_delta: exon,
                    error,
                });
                if let Some(d) = exon {
                    if best_exon.map_or(true, |(b, _)| d.abs() > b.abs()) {
                        best_exon = Some((d, flank));
                    }
                }
            }
        }

        if min_delta.is_none() && best_exon.is_none() {
            return None;
        }
        Some(ModelResult {
            model_id: model_id.to_string(),
            min_delta,
            exon_delta: best_exon.map(|(d, _)| d),
            flank: best_exon.map(|(_, f)| f),
        })
    }

    async fn score_one(&self, variant: &Variant, models: &[String], flanks: &[u32], opts: &ScoreOptions) -> Option<SeqScore> {
        let mut attempts = Vec::new();
        let mut best: Option<ModelResult> = None;
        for model_id in models {
            let Some(result) = self.score_with_model(variant, model_id, flanks, opts, &mut attempts).await else {
                continue;
            };
            let better = match (&best, result.selection_magnitude()) {
                (None, _) => true,
                (Some(b), Some(m)) => m > b.selection_magnitude().unwrap_or(0.0),
                (Some(_), None) => false,
            };
            if better {
                best = Some(result);
            }
        }

        let Some(best) = best else {
            warn!(gene = %variant.gene, variant = %variant.key(), "No model produced a delta; skipping");
            return None;
        };

        let magnitude = best
            .min_delta
            .map(f64::abs)
            .into_iter()
            .chain(best.exon_delta.map(f64::abs))
            .fold(0.0_f64, f64::max);
        let percentile = percentile_like(magnitude);
        let strategy = ScoringStrategy {
            models_tried: models.to_vec(),
            windows_tested: attempts,
            selected_model: Some(best.model_id.clone()),
            selected_flank: best.flank,
            symmetry: opts.symmetry,
            delta_only: opts.delta_only,
            ..Default::default()
        };
        let mut score = SeqScore::new(
            variant.clone(),
            magnitude,
            percentile,
            impact_from_percentile(percentile),
            ScoringMode::AdaptiveEnsemble,
        )
        .with_deltas(best.min_delta, best.exon_delta)
        .with_strategy(strategy);
        apply_hotspot_floor(&mut score);
        apply_truncation_override(&mut score);
        Some(score)
    }
}

#[async_trait]
impl SequenceScorer for AdaptiveEnsembleScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::AdaptiveEnsemble
    }

    fn is_enabled(&self) -> bool {
        self.ensemble_models.iter().any(|m| self.backend.supports(m))
    }

    fn serves_model(&self, model_id: &str) -> bool {
        self.backend.supports(model_id)
    }

    async fn score(&self, mutations: &[Variant], opts: &ScoreOptions) -> Vec<SeqScore> {
        let models = self.candidate_models(opts);
        if models.is_empty() {
            warn!(model_id = %opts.model_id, "No ensemble model has an endpoint");
            return vec![];
        }
        let flanks = self.candidate_flanks(opts);
        let mut out = Vec::with_capacity(mutations.len());
        for variant in mutations {
            if let Some(score) = self.score_one(variant, &models, &flanks, opts).await {
                out.push(score);
            }
        }
        info!(
            scored = out.len(),
            total = mutations.len(),
            models = models.len(),
            flanks = flanks.len(),
            "Ensemble scoring complete"
        );
        out
    }
}
