//! ClinVar-prior service. `POST variant` → `{classification, review_status, prior}`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use efficacy_common::{ClinVarClassification, ClinVarPrior, EfficacyError, Result, Variant};

use super::Endpoint;

#[async_trait]
pub trait ClinVarProvider: Send + Sync {
    /// `Ok(None)` when the variant is not in ClinVar.
    async fn prior(&self, variant: &Variant) -> Result<Option<ClinVarPrior>>;
}

#[derive(Deserialize)]
struct ClinVarReply {
    #[serde(default)]
    classification: Option<String>,
    #[serde(default)]
    review_status: String,
    #[serde(default)]
    prior: f64,
}

pub struct HttpClinVarProvider {
    endpoint: Endpoint,
}

impl HttpClinVarProvider {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self { endpoint: Endpoint::new("clinvar", url, timeout)? })
    }
}

#[async_trait]
impl ClinVarProvider for HttpClinVarProvider {
    #[instrument(skip(self, variant), fields(variant = %variant.key()))]
    async fn prior(&self, variant: &Variant) -> Result<Option<ClinVarPrior>> {
        let reply: ClinVarReply = self.endpoint.post(variant).await?;
        let classification = reply
            .classification
            .as_deref()
            .map(ClinVarClassification::parse)
            .unwrap_or_default();
        if classification == ClinVarClassification::NotFound {
            return Ok(None);
        }
        Ok(Some(ClinVarPrior::new(classification, reply.review_status, reply.prior)))
    }
}

// ── Mock Implementation for Testing ────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockClinVarProvider {
    by_gene: HashMap<String, ClinVarPrior>,
    delay: Option<Duration>,
    failing: bool,
    calls: AtomicUsize,
}

impl MockClinVarProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gene: &str, prior: ClinVarPrior) -> Self {
        self.by_gene.insert(gene.to_uppercase(), prior);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClinVarProvider for MockClinVarProvider {
    async fn prior(&self, variant: &Variant) -> Result<Option<ClinVarPrior>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(EfficacyError::upstream("clinvar", "connection reset"));
        }
        Ok(self.by_gene.get(&variant.gene_upper()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_prior_parsed_and_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"gene": "BRCA1", "ref": "A"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "classification": "Pathogenic",
                "review_status": "reviewed by expert panel",
                "prior": 0.35
            })))
            .mount(&server)
            .await;

        let provider = HttpClinVarProvider::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let v = Variant::new("BRCA1", "17", 43045712, "A", "G");
        let prior = provider.prior(&v).await.unwrap().unwrap();
        assert_eq!(prior.classification, ClinVarClassification::Pathogenic);
        assert_eq!(prior.prior, 0.2);
        assert!(prior.is_strong_pathogenic());
    }

    #[tokio::test]
    async fn test_http_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"classification": null})))
            .mount(&server)
            .await;
        let provider = HttpClinVarProvider::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let v = Variant::new("XYZ", "1", 1, "A", "G");
        assert!(provider.prior(&v).await.unwrap().is_none());
    }
}
