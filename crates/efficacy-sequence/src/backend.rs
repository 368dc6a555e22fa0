//! Variant-effect model service: trait, HTTP client, and a counting mock.
//!
//! Endpoints (relative to the per-model base URL):
//!   POST /score_variant_multi  {assembly, chrom, pos, ref, alt, model_id}         → {delta}
//!   POST /score_variant_exon   {assembly, chrom, pos, ref, alt, model_id, flank}  → {delta}
//!   POST /score_delta          {model_id, ref_sequence, alt_sequence}            → {delta}

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use efficacy_common::config::ScorerConfig;
use efficacy_common::entities::{Assembly, Variant};
use efficacy_common::guarded_client::GuardedClient;
use efficacy_common::{EfficacyError, Result};

/// Scope of the delta the model is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaWindow {
    /// The service's multi-window default; yields `min_delta`.
    MultiWindow,
    /// Explicit exon window of half-width `flank`; yields `exon_delta`.
    Exon { flank: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeltaRequest {
    pub assembly: Assembly,
    pub chrom: String,
    pub pos: u64,
    pub ref_allele: String,
    pub alt_allele: String,
    pub model_id: String,
    pub window: DeltaWindow,
}

impl DeltaRequest {
    pub fn for_variant(variant: &Variant, model_id: &str, window: DeltaWindow) -> Self {
        Self {
            assembly: variant.assembly,
            chrom: variant.chrom_unprefixed().to_string(),
            pos: variant.pos,
            ref_allele: variant.ref_allele.to_uppercase(),
            alt_allele: variant.alt_allele.to_uppercase(),
            model_id: model_id.to_string(),
            window,
        }
    }

    /// Same site scored alt→ref.
    pub fn reversed(&self) -> Self {
        Self {
            ref_allele: self.alt_allele.clone(),
            alt_allele: self.ref_allele.clone(),
            ..self.clone()
        }
    }

    /// `chrom:pos:ref>alt`, matching [`Variant::key`].
    pub fn site_key(&self) -> String {
        format!("{}:{}:{}>{}", self.chrom, self.pos, self.ref_allele, self.alt_allele)
    }
}

#[async_trait]
pub trait EffectBackend: Send + Sync {
    /// True if an endpoint is configured for `model_id`.
    fn supports(&self, model_id: &str) -> bool;

    /// Signed model delta for a single-site change. `Ok(None)` = no score.
    async fn variant_delta(&self, req: &DeltaRequest) -> Result<Option<f64>>;

    /// Signed delta between two explicit sequences.
    async fn sequence_delta(&self, model_id: &str, ref_seq: &str, alt_seq: &str) -> Result<Option<f64>>;
}

// ── HTTP implementation ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct VariantBody<'a> {
    assembly: &'a str,
    chrom: &'a str,
    pos: u64,
    #[serde(rename = "ref")]
    ref_allele: &'a str,
    #[serde(rename = "alt")]
    alt_allele: &'a str,
    model_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    flank: Option<u32>,
}

#[derive(Serialize)]
struct SequenceBody<'a> {
    model_id: &'a str,
    ref_sequence: &'a str,
    alt_sequence: &'a str,
}

#[derive(Deserialize)]
struct DeltaReply {
    #[serde(alias = "min_delta", alias = "exon_delta")]
    delta: Option<f64>,
}

pub struct HttpEffectBackend {
    client: GuardedClient,
    endpoints: BTreeMap<String, String>,
}

impl HttpEffectBackend {
    pub fn new(client: GuardedClient, endpoints: BTreeMap<String, String>) -> Self {
        Self { client, endpoints }
    }

    pub fn from_config(cfg: &ScorerConfig) -> Result<Self> {
        let endpoints: BTreeMap<String, String> = cfg
            .models
            .iter()
            .map(|(model, ep)| (model.clone(), ep.url.trim_end_matches('/').to_string()))
            .collect();
        let urls: Vec<String> = endpoints.values().cloned().collect();
        let client = GuardedClient::new(&urls, Duration::from_secs(cfg.request_timeout_secs))?;
        Ok(Self::new(client, endpoints))
    }

    fn base_url(&self, model_id: &str) -> Result<&str> {
        self.endpoints
            .get(model_id)
            .map(String::as_str)
            .ok_or_else(|| EfficacyError::Configuration(format!("no endpoint configured for model {model_id}")))
    }
}

#[async_trait]
impl EffectBackend for HttpEffectBackend {
    fn supports(&self, model_id: &str) -> bool {
        self.endpoints.contains_key(model_id)
    }

    #[instrument(skip(self), fields(model = %req.model_id, site = %req.site_key()))]
    async fn variant_delta(&self, req: &DeltaRequest) -> Result<Option<f64>> {
        let (path, flank) = match req.window {
            DeltaWindow::MultiWindow => ("score_variant_multi", None),
            DeltaWindow::Exon { flank } => ("score_variant_exon", Some(flank)),
        };
        let url = format!("{}/{path}", self.base_url(&req.model_id)?);
        let body = VariantBody {
            assembly: req.assembly.as_str(),
            chrom: &req.chrom,
            pos: req.pos,
            ref_allele: &req.ref_allele,
            alt_allele: &req.alt_allele,
            model_id: &req.model_id,
            flank,
        };
        let reply: DeltaReply = self.client.post_json("variant_effect", &url, &body).await?;
        debug!(delta = ?reply.delta, "Variant delta received");
        Ok(reply.delta.filter(|d| d.is_finite()))
    }

    #[instrument(skip(self, ref_seq, alt_seq), fields(len = ref_seq.len()))]
    async fn sequence_delta(&self, model_id: &str, ref_seq: &str, alt_seq: &str) -> Result<Option<f64>> {
        let url = format!("{}/score_delta", self.base_url(model_id)?);
        let body = SequenceBody { model_id, ref_sequence: ref_seq, alt_sequence: alt_seq };
        let reply: DeltaReply = self.client.post_json("variant_effect", &url, &body).await?;
        Ok(reply.delta.filter(|d| d.is_finite()))
    }
}

// ── Mock Implementation for Testing ────────────────────────────────────────

#[derive(Debug, Default, Clone)]
struct MockModel {
    multi: Option<f64>,
    exon_by_flank: HashMap<u32, f64>,
    exon_default: Option<f64>,
    sequence: Option<f64>,
    failing: bool,
}

/// Mock backend with per-model canned deltas and call counters.
#[derive(Debug, Default)]
pub struct MockEffectBackend {
    models: HashMap<String, MockModel>,
    /// (model, site key) → multi-window delta override.
    site_multi: HashMap<(String, String), f64>,
    failing_flanks: HashSet<u32>,
    variant_calls: AtomicUsize,
    sequence_calls: AtomicUsize,
    seen_requests: Mutex<Vec<DeltaRequest>>,
}

impl MockEffectBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model that answers with no score until configured.
    pub fn with_model(mut self, model_id: &str) -> Self {
        self.models.entry(model_id.to_string()).or_default();
        self
    }

    pub fn with_multi(mut self, model_id: &str, delta: f64) -> Self {
        self.models.entry(model_id.to_string()).or_default().multi = Some(delta);
        self
    }

    pub fn with_site_multi(mut self, model_id: &str, site_key: &str, delta: f64) -> Self {
        self.models.entry(model_id.to_string()).or_default();
        self.site_multi.insert((model_id.to_string(), site_key.to_string()), delta);
        self
    }

    pub fn with_exon(mut self, model_id: &str, flank: u32, delta: f64) -> Self {
        self.models.entry(model_id.to_string()).or_default().exon_by_flank.insert(flank, delta);
        self
    }

    pub fn with_exon_default(mut self, model_id: &str, delta: f64) -> Self {
        self.models.entry(model_id.to_string()).or_default().exon_default = Some(delta);
        self
    }

    pub fn with_sequence_delta(mut self, model_id: &str, delta: f64) -> Self {
        self.models.entry(model_id.to_string()).or_default().sequence = Some(delta);
        self
    }

    /// Every call for this model fails as if the service were down.
    pub fn failing_model(mut self, model_id: &str) -> Self {
        self.models.entry(model_id.to_string()).or_default().failing = true;
        self
    }

    pub fn failing_flank(mut self, flank: u32) -> Self {
        self.failing_flanks.insert(flank);
        self
    }

    pub fn variant_calls(&self) -> usize {
        self.variant_calls.load(Ordering::SeqCst)
    }

    pub fn sequence_calls(&self) -> usize {
        self.sequence_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.variant_calls() + self.sequence_calls()
    }

    pub fn seen_requests(&self) -> Vec<DeltaRequest> {
        self.seen_requests.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn model(&self, model_id: &str) -> Result<&MockModel> {
        let model = self
            .models
            .get(model_id)
            .ok_or_else(|| EfficacyError::Configuration(format!("no endpoint configured for model {model_id}")))?;
        if model.failing {
            return Err(EfficacyError::upstream("variant_effect", "HTTP 503"));
        }
        Ok(model)
    }
}

#[async_trait]
impl EffectBackend for MockEffectBackend {
    fn supports(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    async fn variant_delta(&self, req: &DeltaRequest) -> Result<Option<f64>> {
        self.variant_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen_requests.lock() {
            seen.push(req.clone());
        }
        let model = self.model(&req.model_id)?;
        match req.window {
            DeltaWindow::MultiWindow => Ok(self
                .site_multi
                .get(&(req.model_id.clone(), req.site_key()))
                .copied()
                .or(model.multi)),
            DeltaWindow::Exon { flank } => {
                if self.failing_flanks.contains(&flank) {
                    return Err(EfficacyError::upstream("variant_effect", format!("flank {flank} rejected")));
                }
                Ok(model.exon_by_flank.get(&flank).copied().or(model.exon_default))
            }
        }
    }

    async fn sequence_delta(&self, model_id: &str, _ref_seq: &str, _alt_seq: &str) -> Result<Option<f64>> {
        self.sequence_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.model(model_id)?.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn braf() -> Variant {
        Variant::new("BRAF", "chr7", 140453136, "T", "A")
    }

    async fn backend_for(server: &MockServer) -> HttpEffectBackend {
        let mut cfg = ScorerConfig::default();
        cfg.models.insert(
            "evo2_1b".into(),
            efficacy_common::config::ModelEndpoint { url: server.uri() },
        );
        HttpEffectBackend::from_config(&cfg).unwrap()
    }

    #[tokio::test]
    async fn test_http_multi_delta() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/score_variant_multi"))
            .and(body_partial_json(serde_json::json!({
                "chrom": "7", "pos": 140453136, "ref": "T", "alt": "A", "model_id": "evo2_1b"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"min_delta": -0.0123})))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let req = DeltaRequest::for_variant(&braf(), "evo2_1b", DeltaWindow::MultiWindow);
        assert_eq!(backend.variant_delta(&req).await.unwrap(), Some(-0.0123));
    }

    #[tokio::test]
    async fn test_http_exon_sends_flank_and_accepts_null() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/score_variant_exon"))
            .and(body_partial_json(serde_json::json!({"flank": 8192})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"delta": null})))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let req = DeltaRequest::for_variant(&braf(), "evo2_1b", DeltaWindow::Exon { flank: 8192 });
        assert_eq!(backend.variant_delta(&req).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_http_5xx_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let req = DeltaRequest::for_variant(&braf(), "evo2_1b", DeltaWindow::MultiWindow);
        let err = backend.variant_delta(&req).await.unwrap_err();
        assert!(matches!(err, EfficacyError::UpstreamUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_unknown_model_is_configuration_error() {
        let server = MockServer::start().await;
        let backend = backend_for(&server).await;
        assert!(!backend.supports("evo2_40b"));
        let req = DeltaRequest::for_variant(&braf(), "evo2_40b", DeltaWindow::MultiWindow);
        assert!(matches!(
            backend.variant_delta(&req).await,
            Err(EfficacyError::Configuration(_))
        ));
    }

    #[test]
    fn test_reversed_swaps_alleles() {
        let req = DeltaRequest::for_variant(&braf(), "evo2_1b", DeltaWindow::MultiWindow);
        let rev = req.reversed();
        assert_eq!(rev.ref_allele, "A");
        assert_eq!(rev.alt_allele, "T");
        assert_eq!(req.site_key(), "7:140453136:T>A");
    }
}
