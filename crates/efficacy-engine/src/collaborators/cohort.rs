use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use efficacy_common::entities::clamp_unit;
use efficacy_common::{EfficacyError, Result};

use super::Endpoint;

/// Fraction of a disease cohort carrying alterations in a gene.
#[async_trait]
pub trait CohortProvider: Send + Sync {
    async fn coverage(&self, gene: &str, disease: &str) -> Result<f64>;
}

#[derive(Serialize)]
struct CohortBody<'a> {
    gene: &'a str,
    disease: &'a str,
}

#[derive(Deserialize)]
struct CohortReply {
    coverage: f64,
}

pub struct HttpCohortProvider {
    endpoint: Endpoint,
}

impl HttpCohortProvider {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self { endpoint: Endpoint::new("cohort", url, timeout)? })
    }
}

#[async_trait]
impl CohortProvider for HttpCohortProvider {
    async fn coverage(&self, gene: &str, disease: &str) -> Result<f64> {
        let reply: CohortReply = self.endpoint.post(&CohortBody { gene, disease }).await?;
        Ok(clamp_unit(reply.coverage))
    }
}

// ── Mock Implementation for Testing ────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockCohortProvider {
    coverage: HashMap<String, f64>,
    delay: Option<Duration>,
    failing: bool,
    calls: AtomicUsize,
}

impl MockCohortProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gene: &str, coverage: f64) -> Self {
        self.coverage.insert(gene.to_uppercase(), coverage);
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
impl CohortProvider for MockCohortProvider {
    async fn coverage(&self, gene: &str, _disease: &str) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(EfficacyError::upstream("cohort", "HTTP 500"));
        }
        Ok(self.coverage.get(&gene.to_uppercase()).copied().unwrap_or(0.0))
    }
}
