//! Functional-insight bundle for the primary variant.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use efficacy_common::{EfficacyError, InsightScores, Result, Variant};

use super::Endpoint;

#[async_trait]
pub trait InsightsProvider: Send + Sync {
    async fn insights(&self, variant: &Variant) -> Result<InsightScores>;
}

/// `POST variant` → `{functionality, chromatin, essentiality, regulatory}`.
pub struct HttpInsightsProvider {
    endpoint: Endpoint,
}

impl HttpInsightsProvider {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self { endpoint: Endpoint::new("insights", url, timeout)? })
    }
}

#[async_trait]
impl InsightsProvider for HttpInsightsProvider {
    #[instrument(skip(self, variant), fields(gene = %variant.gene))]
    async fn insights(&self, variant: &Variant) -> Result<InsightScores> {
        self.endpoint.post(variant).await
    }
}

// ── Mock Implementation for Testing ────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockInsightsProvider {
    scores: InsightScores,
    delay: Option<Duration>,
    failing: bool,
    calls: AtomicUsize,
}

impl MockInsightsProvider {
    pub fn new(scores: InsightScores) -> Self {
        Self { scores, ..Default::default() }
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
impl InsightsProvider for MockInsightsProvider {
    async fn insights(&self, _variant: &Variant) -> Result<InsightScores> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(EfficacyError::upstream("insights", "HTTP 503"));
        }
        Ok(self.scores.clone())
    }
}
