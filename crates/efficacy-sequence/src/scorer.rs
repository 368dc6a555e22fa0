use async_trait::async_trait;

use efficacy_common::provenance::ScorerKind;
use efficacy_common::{EfficacyRequest, SeqScore, Variant};

/// Per-call knobs shared by every scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOptions {
    pub model_id: String,
    pub adaptive: bool,
    pub ensemble: bool,
    pub delta_only: bool,
    pub symmetry: bool,
}

impl ScoreOptions {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            adaptive: true,
            ensemble: true,
            delta_only: false,
            symmetry: false,
        }
    }

    /// Request options layered over the configured defaults.
    pub fn from_request(req: &EfficacyRequest, default_delta_only: bool, default_symmetry: bool) -> Self {
        Self {
            model_id: req.model_id.clone(),
            adaptive: req.options.adaptive,
            ensemble: req.options.ensemble,
            delta_only: req.options.delta_only.unwrap_or(default_delta_only),
            symmetry: req.options.symmetry.unwrap_or(default_symmetry),
        }
    }

    /// Stable fragment for cache keys.
    pub fn cache_tag(&self) -> String {
        format!(
            "{}|a{}|e{}|d{}|s{}",
            self.model_id, self.adaptive as u8, self.ensemble as u8, self.delta_only as u8, self.symmetry as u8
        )
    }
}

/// One variant-effect backend in the fallback chain.
///
/// `score` never fails as a whole: bad mutations are skipped and an
/// unreachable backend yields an empty list.
#[async_trait]
pub trait SequenceScorer: Send + Sync {
    fn kind(&self) -> ScorerKind;

    /// False when the scorer has no backend configured.
    fn is_enabled(&self) -> bool;

    /// True if this scorer can score with `model_id`.
    fn serves_model(&self, model_id: &str) -> bool;

    /// Whether this mutation set is eligible for this scorer at all.
    fn accepts(&self, _mutations: &[Variant]) -> bool {
        true
    }

    async fn score(&self, mutations: &[Variant], opts: &ScoreOptions) -> Vec<SeqScore>;
}
