//! Efficacy Orchestrator: the single `predict` entry point.
//!
//! Pipeline per request:
//!   1. Validate and resolve the model (configuration errors are fatal).
//!   2. Load the disease panel (truncated for fast / limited runs).
//!   3. Sequence Processor over the whole mutation set.
//!   4. Pathway aggregation.
//!   5. Evidence/insight fan-out under one deadline.
//!   6. Ablation masks, then per-drug scoring.
//!   7. Opt-in post-processing, bounded by the evidence deadline.
//!   8. Rank by confidence and assemble provenance.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};
use uuid::Uuid;

use efficacy_cache::CacheService;
use efficacy_common::request::RunStrategy;
use efficacy_common::{
    DrugScoreResult, EfficacyError, EfficacyRequest, EfficacyResponse, EngineConfig, EvidenceTier, FallbackReason,
    PathwayScoreMap, Provenance, Result, SeqScore, Variant,
};
use efficacy_ranker::{DrugScorer, DrugSignals, PanelRegistry, PathwayAggregator};
use efficacy_sequence::{ScoreOptions, SequenceProcessor};

use crate::collaborators::Collaborators;
use crate::evidence::{EvidenceBundle, EvidenceGatherer, EvidencePlan};
use crate::postprocess::PostProcessor;

pub struct EfficacyOrchestrator {
    sequence: SequenceProcessor,
    aggregator: PathwayAggregator,
    scorer: DrugScorer,
    panels: PanelRegistry,
    evidence: EvidenceGatherer,
    postprocess: PostProcessor,
    default_delta_only: bool,
    default_symmetry: bool,
    fast_panel_limit: usize,
}

impl EfficacyOrchestrator {
    /// Production wiring: HTTP backends and collaborators from `cfg`, one
    /// in-process cache shared by sequence and evidence caching.
    pub fn from_config(cfg: &EngineConfig) -> Result<Self> {
        let cache = Arc::new(CacheService::in_memory(&cfg.cache));
        let sequence = SequenceProcessor::from_config(&cfg.scorers)?.with_cache(cache.clone());
        let collaborators = Collaborators::from_config(cfg)?;
        let mut panels = PanelRegistry::builtin();
        if let Some(path) = &cfg.evidence.panels_file {
            panels.merge_yaml_file(Path::new(path))?;
        }
        Ok(Self::new(cfg, sequence, collaborators, Some(cache)).with_panels(panels))
    }

    pub fn new(
        cfg: &EngineConfig,
        sequence: SequenceProcessor,
        collaborators: Collaborators,
        cache: Option<Arc<CacheService>>,
    ) -> Self {
        let mut evidence = EvidenceGatherer::new(&collaborators, Duration::from_millis(cfg.evidence.deadline_ms));
        if let Some(cache) = cache {
            evidence = evidence.with_cache(cache);
        }
        Self {
            sequence,
            aggregator: PathwayAggregator::new(&cfg.thresholds),
            scorer: DrugScorer::new(cfg.thresholds.clone(), cfg.confidence.clone()),
            panels: PanelRegistry::builtin(),
            evidence,
            postprocess: PostProcessor::new(&collaborators, cfg.confidence.clone()),
            default_delta_only: cfg.scorers.delta_only,
            default_symmetry: cfg.scorers.symmetry,
            fast_panel_limit: cfg.evidence.fast_panel_limit,
        }
    }

    pub fn with_panels(mut self, panels: PanelRegistry) -> Self {
        self.panels = panels;
        self
    }

    pub fn panels(&self) -> &PanelRegistry {
        &self.panels
    }

    /// Rank the disease panel for `req`.
    ///
    /// Fails only when the request is unusable (no valid mutation) or the
    /// requested model has no configured backend.
    #[instrument(skip(self, req), fields(model_id = %req.model_id, disease = %req.disease, mutations = req.mutations.len()))]
    pub async fn predict(&self, req: &EfficacyRequest) -> Result<EfficacyResponse> {
        let started = Instant::now();
        if req.mutations.is_empty() {
            return Err(EfficacyError::InvalidVariant("request carries no mutations".into()));
        }
        self.sequence.ensure_model(&req.model_id)?;

        let opts = &req.options;
        let ablation = opts.ablation_mode;
        let run_id = Uuid::new_v4().to_string();
        let mut provenance = Provenance::new(&run_id, &req.model_id, &req.disease, ablation.to_string());

        let limit = opts.limit_panel.or(opts.fast.then_some(self.fast_panel_limit));
        let panel = self.panels.panel_limited(&req.disease, limit);

        // ── Sequence ──
        let t = Instant::now();
        let score_opts = ScoreOptions::from_request(req, self.default_delta_only, self.default_symmetry);
        let seq = self.sequence.process(&req.mutations, &score_opts).await;
        provenance.timing("sequence", elapsed_ms(t));
        provenance.sequence_chain = seq.chain.clone();
        provenance.sequence_mode = seq.mode();
        provenance.skipped_variants = seq.skipped.clone();

        let valid: Vec<Variant> = req.mutations.iter().filter(|v| v.validate().is_ok()).cloned().collect();
        let Some(primary) = valid.first() else {
            return Err(EfficacyError::InvalidVariant(seq.skipped.join("; ")));
        };
        if seq.is_empty() {
            warn!("No scorer produced sequence scores");
            provenance.record_fallback(FallbackReason::SequenceEmpty);
        }
        let fusion_active = seq.fusion_active();
        provenance.flag("fusion", fusion_active);

        // ── Pathway ──
        let pathway_scores = self.aggregator.aggregate(&seq.scores);

        // ── Evidence ──
        let deadline = tokio::time::Instant::now() + self.evidence.deadline();
        let (plan, plan_reasons) = EvidencePlan::from_options(opts);
        for reason in plan_reasons {
            provenance.record_fallback(reason);
        }
        let bundle = if plan.is_empty() {
            EvidenceBundle::empty(panel.len())
        } else {
            self.evidence.gather_until(primary, &req.disease, &panel, plan, deadline).await
        };
        provenance.timing("evidence", bundle.elapsed_ms);
        for reason in &bundle.reasons {
            provenance.record_fallback(*reason);
        }
        provenance.flag("literature", bundle.literature.iter().any(Option::is_some));
        provenance.flag("clinvar", bundle.clinvar.is_some());
        provenance.flag("insights", bundle.insights.is_some());

        // ── Masks + scoring ──
        let t = Instant::now();
        let masked_path = PathwayScoreMap::new();
        let seq_scores: &[SeqScore] = if ablation.sequence { &seq.scores } else { &[] };
        let path_scores = if ablation.pathway { &pathway_scores } else { &masked_path };
        let clinvar = if ablation.evidence { bundle.clinvar.as_ref() } else { None };
        let variant_genes: Vec<String> = valid.iter().map(Variant::gene_upper).collect();

        let mut drugs: Vec<DrugScoreResult> = panel
            .iter()
            .zip(&bundle.literature)
            .map(|(drug, literature)| {
                let signals = DrugSignals {
                    seq_scores,
                    pathway_scores: path_scores,
                    evidence: if ablation.evidence { literature.as_ref() } else { None },
                    clinvar,
                    insights: bundle.insights.as_ref(),
                    variant_genes: &variant_genes,
                    fusion_active: ablation.sequence && fusion_active,
                };
                self.scorer.score(drug, &signals)
            })
            .collect();
        provenance.timing("scoring", elapsed_ms(t));

        // ── Post-processing (before ranking, so drugs[i] is still panel[i]) ──
        let t = Instant::now();
        let extras = self
            .postprocess
            .run(req, &valid, &panel, &mut drugs, &mut provenance, deadline)
            .await;
        provenance.timing("postprocess", elapsed_ms(t));

        drugs.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        let evidence_tier = drugs.first().map_or(EvidenceTier::Insufficient, |d| d.evidence_tier);

        let mut models_considered: Vec<String> = Vec::new();
        for model in seq.scores.iter().flat_map(|s| &s.scoring_strategy.models_tried) {
            if !models_considered.contains(model) {
                models_considered.push(model.clone());
            }
        }
        if models_considered.is_empty() {
            models_considered.push(req.model_id.clone());
        }
        let scoring_strategy = RunStrategy {
            sequence_mode: seq.mode(),
            adaptive: score_opts.adaptive,
            ensemble: score_opts.ensemble,
            delta_only: score_opts.delta_only,
            symmetry: score_opts.symmetry,
            fast: opts.fast,
            ablation: ablation.to_string(),
            models_considered,
        };

        provenance.timing("total", elapsed_ms(started));
        info!(
            run_id = %run_id,
            drugs = drugs.len(),
            top = drugs.first().map(|d| d.name.as_str()).unwrap_or("-"),
            tier = evidence_tier.as_str(),
            fallback = ?provenance.fallback,
            elapsed_ms = elapsed_ms(started),
            "Efficacy prediction complete"
        );

        Ok(EfficacyResponse {
            run_signature: run_id,
            drugs,
            evidence_tier,
            pathway_scores,
            sequence_details: seq.scores,
            scoring_strategy,
            sae_features: extras.sae_features,
            cohort_signals: extras.cohort_signals,
            provenance,
        })
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
