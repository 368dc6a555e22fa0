//! Mechanistic-score (fusion) service client.
//!
//! `POST {base}/score {"variant": "<encoding>"}` → `{"score": float|null}`.
//! The service schema varies between deployments, so callers try several
//! encodings of one variant and take the first usable value.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use efficacy_common::guarded_client::GuardedClient;
use efficacy_common::{EfficacyError, Result};

#[async_trait]
pub trait MechanisticBackend: Send + Sync {
    /// Score for one encoding. `Ok(None)` means the service returned a sentinel.
    async fn lookup(&self, encoding: &str) -> Result<Option<f64>>;
}

/// Null, non-finite, and out-of-range replies are sentinels, not scores.
pub fn usable_score(raw: Option<f64>) -> Option<f64> {
    raw.filter(|s| s.is_finite() && (0.0..=1.0).contains(s))
}

#[derive(Serialize)]
struct LookupBody<'a> {
    variant: &'a str,
}

#[derive(Deserialize)]
struct LookupReply {
    #[serde(default, alias = "fused_score", alias = "am_score")]
    score: Option<f64>,
}

pub struct HttpMechanisticBackend {
    client: GuardedClient,
    base_url: String,
}

impl HttpMechanisticBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = GuardedClient::new(std::slice::from_ref(&base_url), timeout)?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl MechanisticBackend for HttpMechanisticBackend {
    #[instrument(skip(self))]
    async fn lookup(&self, encoding: &str) -> Result<Option<f64>> {
        let url = format!("{}/score", self.base_url);
        let reply: LookupReply = self
            .client
            .post_json("mechanistic_score", &url, &LookupBody { variant: encoding })
            .await?;
        Ok(usable_score(reply.score))
    }
}

// ── Mock Implementation for Testing ────────────────────────────────────────

/// Answers only for registered encodings; everything else is a sentinel.
#[derive(Debug, Default)]
pub struct MockMechanisticBackend {
    scores: HashMap<String, f64>,
    unavailable: bool,
    calls: AtomicUsize,
}

impl MockMechanisticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, encoding: &str, score: f64) -> Self {
        self.scores.insert(encoding.to_string(), score);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MechanisticBackend for MockMechanisticBackend {
    async fn lookup(&self, encoding: &str) -> Result<Option<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(EfficacyError::upstream("mechanistic_score", "connection refused"));
        }
        Ok(usable_score(self.scores.get(encoding).copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_sentinels_rejected() {
        assert_eq!(usable_score(Some(0.42)), Some(0.42));
        assert_eq!(usable_score(Some(-1.0)), None);
        assert_eq!(usable_score(Some(f64::NAN)), None);
        assert_eq!(usable_score(None), None);
    }

    #[tokio::test]
    async fn test_http_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/score"))
            .and(body_json(serde_json::json!({"variant": "chr7:140453136:T:A"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"score": 0.93})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/score"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"score": -999.0})))
            .mount(&server)
            .await;

        let backend = HttpMechanisticBackend::new(&server.uri(), Duration::from_secs(5)).unwrap();
        assert_eq!(backend.lookup("chr7:140453136:T:A").await.unwrap(), Some(0.93));
        assert_eq!(backend.lookup("7:140453136:T:A").await.unwrap(), None);
    }
}
