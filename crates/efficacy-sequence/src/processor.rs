//! Sequence Processor: the priority fallback chain over the three scorers.
//!
//! fusion → adaptive ensemble → large context → empty. A scorer is skipped
//! when killed by configuration, unconfigured, or ineligible for the mutation
//! set; the chain advances past one that returns nothing and stops at the first
//! that returns anything.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use efficacy_cache::{CacheService, Cacheable};
use efficacy_common::config::{LargeContextMode, ScorerConfig};
use efficacy_common::provenance::{ChainStep, ScorerKind, StepOutcome};
use efficacy_common::{EfficacyError, Result, ScoringMode, SeqScore, Variant};

use crate::backend::{EffectBackend, HttpEffectBackend};
use crate::ensemble::AdaptiveEnsembleScorer;
use crate::fusion::FusionScorer;
use crate::genome::{EnsemblGenomeSource, GenomeWindowSource};
use crate::large_context::LargeContextScorer;
use crate::mechanistic::{HttpMechanisticBackend, MechanisticBackend};
use crate::scorer::{ScoreOptions, SequenceScorer};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceOutcome {
    pub scores: Vec<SeqScore>,
    pub chain: Vec<ChainStep>,
    /// Mutations rejected before scoring, with the reason.
    #[serde(default)]
    pub skipped: Vec<String>,
}

impl SequenceOutcome {
    /// Mode of the scorer that produced the scores (one per run).
    pub fn mode(&self) -> Option<ScoringMode> {
        self.scores.first().map(|s| s.scoring_mode)
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn fusion_active(&self) -> bool {
        self.mode().is_some_and(|m| m.is_fusion())
    }
}

impl Cacheable for SequenceOutcome {
    const KIND: &'static str = "sequence_outcome";
    const VERSION: u32 = 1;
}

pub struct SequenceProcessor {
    scorers: Vec<Arc<dyn SequenceScorer>>,
    killed: HashSet<ScorerKind>,
    cache: Option<Arc<CacheService>>,
}

impl SequenceProcessor {
    /// Chain over `scorers` in the given priority order.
    pub fn new(scorers: Vec<Arc<dyn SequenceScorer>>) -> Self {
        Self { scorers, killed: HashSet::new(), cache: None }
    }

    /// Standard chain with explicit backends.
    pub fn with_backends(
        cfg: &ScorerConfig,
        effect: Arc<dyn EffectBackend>,
        mechanistic: Option<Arc<dyn MechanisticBackend>>,
        genome: Option<Arc<dyn GenomeWindowSource>>,
    ) -> Self {
        let scorers: Vec<Arc<dyn SequenceScorer>> = vec![
            Arc::new(FusionScorer::new(mechanistic)),
            Arc::new(AdaptiveEnsembleScorer::new(effect.clone(), cfg)),
            Arc::new(LargeContextScorer::new(effect, genome, cfg)),
        ];
        Self::new(scorers).with_kill_switches(cfg)
    }

    /// Standard chain with HTTP backends built from configuration.
    pub fn from_config(cfg: &ScorerConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.request_timeout_secs);
        let effect: Arc<dyn EffectBackend> = Arc::new(HttpEffectBackend::from_config(cfg)?);
        let mechanistic = match &cfg.fusion_url {
            Some(url) => Some(Arc::new(HttpMechanisticBackend::new(url, timeout)?) as Arc<dyn MechanisticBackend>),
            None => None,
        };
        let genome = match cfg.large_context_mode {
            LargeContextMode::RealContext => {
                Some(Arc::new(EnsemblGenomeSource::new(&cfg.genome_url, timeout)?) as Arc<dyn GenomeWindowSource>)
            }
            LargeContextMode::Synthetic => None,
        };
        Ok(Self::with_backends(cfg, effect, mechanistic, genome))
    }

    pub fn with_kill_switches(mut self, cfg: &ScorerConfig) -> Self {
        for (off, kind) in [
            (cfg.disable_fusion, ScorerKind::Fusion),
            (cfg.disable_ensemble, ScorerKind::AdaptiveEnsemble),
            (cfg.disable_large_context, ScorerKind::LargeContext),
        ] {
            if off {
                self.killed.insert(kind);
            }
        }
        self
    }

    pub fn with_cache(mut self, cache: Arc<CacheService>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn is_live(&self, scorer: &dyn SequenceScorer) -> bool {
        !self.killed.contains(&scorer.kind()) && scorer.is_enabled()
    }

    /// Fails with a configuration error when no live scorer has an endpoint
    /// for `model_id`.
    pub fn ensure_model(&self, model_id: &str) -> Result<()> {
        if self
            .scorers
            .iter()
            .any(|s| self.is_live(s.as_ref()) && s.serves_model(model_id))
        {
            Ok(())
        } else {
            Err(EfficacyError::Configuration(format!(
                "no variant-effect backend configured for model {model_id}"
            )))
        }
    }

    /// Score a mutation set through the fallback chain. Invalid mutations are
    /// skipped and listed; the rest proceed.
    #[instrument(skip(self, mutations), fields(mutations = mutations.len(), model_id = %opts.model_id))]
    pub async fn process(&self, mutations: &[Variant], opts: &ScoreOptions) -> SequenceOutcome {
        let mut valid = Vec::with_capacity(mutations.len());
        let mut skipped = Vec::new();
        for v in mutations {
            match v.validate() {
                Ok(()) => valid.push(v.clone()),
                Err(e) => {
                    warn!(error = %e, "Skipping invalid mutation");
                    skipped.push(e.to_string());
                }
            }
        }
        if valid.is_empty() {
            return SequenceOutcome { skipped, ..Default::default() };
        }

        let mut outcome = match &self.cache {
            Some(cache) => {
                let key = Self::cache_key(&valid, opts);
                // Empty outcomes travel as Err so they are never cached.
                let result: std::result::Result<SequenceOutcome, SequenceOutcome> = cache
                    .with_single_flight(&key, cache.config().lock_ttl, || async {
                        let o = self.run_chain(&valid, opts).await;
                        if o.is_empty() {
                            Err(o)
                        } else {
                            Ok(o)
                        }
                    })
                    .await;
                match result {
                    Ok(o) | Err(o) => o,
                }
            }
            None => self.run_chain(&valid, opts).await,
        };
        outcome.skipped = skipped;
        outcome
    }

    fn cache_key(valid: &[Variant], opts: &ScoreOptions) -> String {
        let tag = opts.cache_tag();
        let variants: Vec<String> = valid
            .iter()
            .map(|v| serde_json::to_string(v).unwrap_or_else(|_| v.key()))
            .collect();
        let mut parts: Vec<&str> = vec![tag.as_str()];
        parts.extend(variants.iter().map(String::as_str));
        CacheService::key("seq", &parts)
    }

    async fn run_chain(&self, valid: &[Variant], opts: &ScoreOptions) -> SequenceOutcome {
        let mut chain = Vec::with_capacity(self.scorers.len());
        for scorer in &self.scorers {
            let kind = scorer.kind();
            if !self.is_live(scorer.as_ref()) {
                chain.push(ChainStep { scorer: kind, outcome: StepOutcome::Disabled });
                continue;
            }
            if !scorer.accepts(valid) {
                chain.push(ChainStep { scorer: kind, outcome: StepOutcome::Ineligible });
                continue;
            }
            let scores = scorer.score(valid, opts).await;
            if scores.is_empty() {
                warn!(scorer = ?kind, "Scorer produced no results; falling back");
                chain.push(ChainStep { scorer: kind, outcome: StepOutcome::Empty });
                continue;
            }
            info!(scorer = ?kind, count = scores.len(), "Sequence scoring settled");
            chain.push(ChainStep { scorer: kind, outcome: StepOutcome::Produced { count: scores.len() } });
            return SequenceOutcome { scores, chain, skipped: vec![] };
        }
        warn!("Every sequence scorer came up empty");
        SequenceOutcome { scores: vec![], chain, skipped: vec![] }
    }
}
