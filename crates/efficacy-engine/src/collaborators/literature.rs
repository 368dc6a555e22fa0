//! Literature-evidence service.
//!
//! `POST {gene, hgvs_p, disease, drug_name, moa}` → `{strength, citations, query}`

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use efficacy_common::entities::clamp_unit;
use efficacy_common::{Citation, EfficacyError, EvidenceResult, Result};

use super::Endpoint;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiteratureQuery {
    pub gene: String,
    pub hgvs_p: Option<String>,
    pub disease: String,
    pub drug_name: String,
    pub moa: String,
}

#[async_trait]
pub trait LiteratureProvider: Send + Sync {
    async fn search(&self, query: &LiteratureQuery) -> Result<EvidenceResult>;
}

#[derive(Deserialize)]
struct LiteratureReply {
    #[serde(default)]
    strength: f64,
    #[serde(default)]
    citations: Vec<Citation>,
    #[serde(default)]
    raw: Vec<Citation>,
    #[serde(default)]
    query: String,
}

pub struct HttpLiteratureProvider {
    endpoint: Endpoint,
}

impl HttpLiteratureProvider {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self { endpoint: Endpoint::new("literature", url, timeout)? })
    }
}

#[async_trait]
impl LiteratureProvider for HttpLiteratureProvider {
    #[instrument(skip(self), fields(drug = %query.drug_name))]
    async fn search(&self, query: &LiteratureQuery) -> Result<EvidenceResult> {
        let reply: LiteratureReply = self.endpoint.post(query).await?;
        let raw = if reply.raw.is_empty() { reply.citations.clone() } else { reply.raw };
        Ok(EvidenceResult {
            strength: clamp_unit(reply.strength),
            filtered: reply.citations,
            raw,
            query: reply.query,
        })
    }
}

// ── Mock Implementation for Testing ────────────────────────────────────────

/// Per-drug canned evidence with optional latency.
#[derive(Debug, Default)]
pub struct MockLiteratureProvider {
    by_drug: HashMap<String, EvidenceResult>,
    delays: HashMap<String, Duration>,
    default_delay: Option<Duration>,
    failing: bool,
    calls: AtomicUsize,
}

impl MockLiteratureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, drug: &str, strength: f64) -> Self {
        self.by_drug.insert(
            drug.to_string(),
            EvidenceResult { strength, query: drug.to_string(), ..Default::default() },
        );
        self
    }

    pub fn with_result(mut self, drug: &str, result: EvidenceResult) -> Self {
        self.by_drug.insert(drug.to_string(), result);
        self
    }

    pub fn with_delay(mut self, drug: &str, delay: Duration) -> Self {
        self.delays.insert(drug.to_string(), delay);
        self
    }

    /// Every lookup sleeps this long first.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
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
impl LiteratureProvider for MockLiteratureProvider {
    async fn search(&self, query: &LiteratureQuery) -> Result<EvidenceResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&query.drug_name).copied().or(self.default_delay) {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(EfficacyError::upstream("literature", "HTTP 502"));
        }
        Ok(self.by_drug.get(&query.drug_name).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_search() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"gene": "BRAF", "drug_name": "BRAF inhibitor"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "strength": 0.72,
                "citations": [{"pmid": "123", "title": "t", "publication_types": ["Randomized Controlled Trial"]}],
                "query": "BRAF V600E melanoma"
            })))
            .mount(&server)
            .await;

        let provider = HttpLiteratureProvider::new(&format!("{}/evidence", server.uri()), Duration::from_secs(5)).unwrap();
        let q = LiteratureQuery {
            gene: "BRAF".into(),
            hgvs_p: Some("p.V600E".into()),
            disease: "melanoma".into(),
            drug_name: "BRAF inhibitor".into(),
            moa: "BRAF_inhibition".into(),
        };
        let ev = provider.search(&q).await.unwrap();
        assert_eq!(ev.strength, 0.72);
        assert_eq!(ev.filtered.len(), 1);
        assert_eq!(ev.raw.len(), 1);
        assert!(ev.filtered[0].has_publication_type("randomized"));
    }

    #[tokio::test]
    async fn test_http_error_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let provider = HttpLiteratureProvider::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let q = LiteratureQuery {
            gene: "TP53".into(),
            hgvs_p: None,
            disease: "ovarian_cancer".into(),
            drug_name: "Olaparib".into(),
            moa: "PARP".into(),
        };
        assert!(matches!(provider.search(&q).await, Err(EfficacyError::UpstreamUnavailable { .. })));
    }
}
