//! Engine configuration.
//!
//! Reads `efficacy.toml` from the current directory, or the path in the
//! `EFFICACY_CONFIG` env var. Every field has a default, so an empty (or
//! missing) file yields a working configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EfficacyError, Result};

pub const CONFIG_ENV_VAR: &str = "EFFICACY_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "efficacy.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scorers: ScorerConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

// ── Scorers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LargeContextMode {
    #[default]
    Synthetic,
    RealContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEndpoint {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// model_id → variant-effect service base URL.
    #[serde(default)]
    pub models: BTreeMap<String, ModelEndpoint>,
    /// Mechanistic-score (fusion) service base URL.
    #[serde(default)]
    pub fusion_url: Option<String>,
    #[serde(default = "default_genome_url")]
    pub genome_url: String,

    #[serde(default)]
    pub disable_fusion: bool,
    #[serde(default)]
    pub disable_ensemble: bool,
    #[serde(default)]
    pub disable_large_context: bool,

    #[serde(default = "default_ensemble_models")]
    pub ensemble_models: Vec<String>,
    #[serde(default = "default_flanks")]
    pub flanks: Vec<u32>,
    /// Upper bound on models queried per variant.
    #[serde(default = "default_max_models")]
    pub max_models: usize,
    /// Upper bound on flanks tried per model.
    #[serde(default = "default_max_flanks")]
    pub max_flanks: usize,
    #[serde(default)]
    pub symmetry: bool,
    #[serde(default)]
    pub delta_only: bool,

    #[serde(default)]
    pub large_context_mode: LargeContextMode,
    /// Half-width of the synthetic contrast sequence.
    #[serde(default = "default_synthetic_flank")]
    pub synthetic_flank: u32,
    /// Half-width of the fetched reference window.
    #[serde(default = "default_genome_flank")]
    pub genome_flank: u32,
    #[serde(default = "default_backend_timeout")]
    pub request_timeout_secs: u64,
}

fn default_genome_url() -> String { "https://rest.ensembl.org".to_string() }
fn default_ensemble_models() -> Vec<String> {
    vec!["evo2_1b".to_string(), "evo2_7b".to_string(), "evo2_40b".to_string()]
}
fn default_flanks() -> Vec<u32> { vec![4096, 8192, 16384, 25000] }
fn default_max_models() -> usize { 3 }
fn default_max_flanks() -> usize { 4 }
fn default_synthetic_flank() -> u32 { 8192 }
fn default_genome_flank() -> u32 { 4096 }
fn default_backend_timeout() -> u64 { 30 }

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            models: BTreeMap::new(),
            fusion_url: None,
            genome_url: default_genome_url(),
            disable_fusion: false,
            disable_ensemble: false,
            disable_large_context: false,
            ensemble_models: default_ensemble_models(),
            flanks: default_flanks(),
            max_models: default_max_models(),
            max_flanks: default_max_flanks(),
            symmetry: false,
            delta_only: false,
            large_context_mode: LargeContextMode::default(),
            synthetic_flank: default_synthetic_flank(),
            genome_flank: default_genome_flank(),
            request_timeout_secs: default_backend_timeout(),
        }
    }
}

// ── Thresholds ───────────────────────────────────────────────────────────────

/// Calibration constants. The DDR gate, hotspot lift bound, and pathway rescale
/// divisor are hand-tuned and awaiting domain-expert review; keep the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_evidence_gate")]
    pub evidence_gate_threshold: f64,
    #[serde(default = "default_pathway_alignment")]
    pub pathway_alignment_threshold: f64,
    #[serde(default = "default_insufficient_seq")]
    pub insufficient_seq_floor: f64,
    #[serde(default = "default_insufficient_path")]
    pub insufficient_path_floor: f64,
    #[serde(default = "default_insufficient_evd")]
    pub insufficient_evd_floor: f64,
    #[serde(default = "default_ddr_gate")]
    pub ddr_missense_gate: f64,
    #[serde(default = "default_hotspot_percentile")]
    pub hotspot_percentile: f64,
    #[serde(default = "default_hotspot_bound")]
    pub hotspot_lift_bound: f64,
    #[serde(default = "default_rescale_divisor")]
    pub pathway_rescale_divisor: f64,
}

fn default_evidence_gate() -> f64 { 0.7 }
fn default_pathway_alignment() -> f64 { 0.2 }
fn default_insufficient_seq() -> f64 { 0.02 }
fn default_insufficient_path() -> f64 { 0.05 }
fn default_insufficient_evd() -> f64 { 0.02 }
fn default_ddr_gate() -> f64 { 0.02 }
fn default_hotspot_percentile() -> f64 { 0.7 }
fn default_hotspot_bound() -> f64 { 0.5 }
fn default_rescale_divisor() -> f64 { 0.005 }

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            evidence_gate_threshold: default_evidence_gate(),
            pathway_alignment_threshold: default_pathway_alignment(),
            insufficient_seq_floor: default_insufficient_seq(),
            insufficient_path_floor: default_insufficient_path(),
            insufficient_evd_floor: default_insufficient_evd(),
            ddr_missense_gate: default_ddr_gate(),
            hotspot_percentile: default_hotspot_percentile(),
            hotspot_lift_bound: default_hotspot_bound(),
            pathway_rescale_divisor: default_rescale_divisor(),
        }
    }
}

// ── Confidence adjustments ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default = "default_insight_cap")]
    pub insight_lift_cap: f64,
    #[serde(default = "default_clinvar_cap")]
    pub clinvar_bonus_cap: f64,
    #[serde(default = "default_moa_bonus")]
    pub moa_match_bonus: f64,
    #[serde(default = "default_ddr_penalty")]
    pub ddr_only_penalty: f64,
    #[serde(default = "default_family_bump")]
    pub gene_family_bump: f64,
    #[serde(default = "default_fusion_floor")]
    pub fusion_insufficient_floor: f64,
    #[serde(default = "default_cohort_cap")]
    pub cohort_lift_cap: f64,
    #[serde(default = "default_cross_resistance")]
    pub cross_resistance_penalty: f64,
    #[serde(default = "default_cross_resistance_cap")]
    pub cross_resistance_cap: f64,
}

fn default_insight_cap() -> f64 { 0.10 }
fn default_clinvar_cap() -> f64 { 0.10 }
fn default_moa_bonus() -> f64 { 0.10 }
fn default_ddr_penalty() -> f64 { 0.15 }
fn default_family_bump() -> f64 { 0.08 }
fn default_fusion_floor() -> f64 { 0.05 }
fn default_cohort_cap() -> f64 { 0.05 }
fn default_cross_resistance() -> f64 { 0.10 }
fn default_cross_resistance_cap() -> f64 { 0.20 }

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            insight_lift_cap: default_insight_cap(),
            clinvar_bonus_cap: default_clinvar_cap(),
            moa_match_bonus: default_moa_bonus(),
            ddr_only_penalty: default_ddr_penalty(),
            gene_family_bump: default_family_bump(),
            fusion_insufficient_floor: default_fusion_floor(),
            cohort_lift_cap: default_cohort_cap(),
            cross_resistance_penalty: default_cross_resistance(),
            cross_resistance_cap: default_cross_resistance_cap(),
        }
    }
}

// ── Evidence collaborators ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    #[serde(default)]
    pub literature_url: Option<String>,
    #[serde(default)]
    pub clinvar_url: Option<String>,
    #[serde(default)]
    pub insights_url: Option<String>,
    #[serde(default)]
    pub cohort_url: Option<String>,
    #[serde(default)]
    pub calibration_url: Option<String>,
    #[serde(default)]
    pub sae_url: Option<String>,
    /// Single deadline bounding the whole evidence/insight fan-out.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Panel size used by the fast profile when no explicit limit is given.
    #[serde(default = "default_fast_panel")]
    pub fast_panel_limit: usize,
    /// Optional YAML file with extra disease panels.
    #[serde(default)]
    pub panels_file: Option<String>,
}

fn default_deadline_ms() -> u64 { 30_000 }
fn default_fast_panel() -> usize { 8 }

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            literature_url: None,
            clinvar_url: None,
            insights_url: None,
            cohort_url: None,
            calibration_url: None,
            sae_url: None,
            deadline_ms: default_deadline_ms(),
            fast_panel_limit: default_fast_panel(),
            panels_file: None,
        }
    }
}

// ── Cache ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default = "default_value_ttl")]
    pub value_ttl_secs: u64,
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,
    /// How many times a lock loser re-reads the cache before computing itself.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_backoff")]
    pub poll_backoff_ms: u64,
}

fn default_max_entries() -> u64 { 10_000 }
fn default_value_ttl() -> u64 { 3600 }
fn default_lock_ttl() -> u64 { 30 }
fn default_poll_attempts() -> u32 { 2 }
fn default_poll_backoff() -> u64 { 250 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            value_ttl_secs: default_value_ttl(),
            lock_ttl_secs: default_lock_ttl(),
            poll_attempts: default_poll_attempts(),
            poll_backoff_ms: default_poll_backoff(),
        }
    }
}

// ── Server ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String { "127.0.0.1:3001".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

// ── Loading ──────────────────────────────────────────────────────────────────

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| EfficacyError::Configuration(format!("invalid engine config: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EfficacyError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from `$EFFICACY_CONFIG`, else `./efficacy.toml`, else defaults.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            info!(path = %path, "Loading engine config from env");
            return Self::from_file(Path::new(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            info!(path = %local.display(), "Loading engine config");
            return Self::from_file(local);
        }
        warn!("No {DEFAULT_CONFIG_FILE} found; using built-in defaults (no scorer backends configured)");
        Ok(Self::default())
    }

    /// Every configured collaborator URL, used to seed the HTTP allow-list.
    pub fn endpoint_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.scorers.models.values().map(|m| m.url.clone()).collect();
        urls.push(self.scorers.genome_url.clone());
        urls.extend(
            [
                &self.scorers.fusion_url,
                &self.evidence.literature_url,
                &self.evidence.clinvar_url,
                &self.evidence.insights_url,
                &self.evidence.cohort_url,
                &self.evidence.calibration_url,
                &self.evidence.sae_url,
            ]
            .into_iter()
            .flatten()
            .cloned(),
        );
        urls
    }
}
