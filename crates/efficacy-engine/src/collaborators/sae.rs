use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use efficacy_common::entities::SaeFeature;
use efficacy_common::{EfficacyError, Result, Variant};

use super::Endpoint;

/// Sparse-autoencoder feature activations for one variant.
#[async_trait]
pub trait SaeExtractor: Send + Sync {
    async fn features(&self, variant: &Variant, model_id: &str) -> Result<Vec<SaeFeature>>;
}

#[derive(Serialize)]
struct SaeBody<'a> {
    #[serde(flatten)]
    variant: &'a Variant,
    model_id: &'a str,
}

#[derive(Deserialize)]
struct SaeReply {
    #[serde(default)]
    features: Vec<SaeFeature>,
}

pub struct HttpSaeExtractor {
    endpoint: Endpoint,
}

impl HttpSaeExtractor {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self { endpoint: Endpoint::new("sae", url, timeout)? })
    }
}

#[async_trait]
impl SaeExtractor for HttpSaeExtractor {
    async fn features(&self, variant: &Variant, model_id: &str) -> Result<Vec<SaeFeature>> {
        let reply: SaeReply = self.endpoint.post(&SaeBody { variant, model_id }).await?;
        Ok(reply.features)
    }
}

// ── Mock Implementation for Testing ────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockSaeExtractor {
    features: Vec<SaeFeature>,
    failing: bool,
    calls: AtomicUsize,
}

impl MockSaeExtractor {
    pub fn new(features: Vec<SaeFeature>) -> Self {
        Self { features, ..Default::default() }
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
impl SaeExtractor for MockSaeExtractor {
    async fn features(&self, _variant: &Variant, _model_id: &str) -> Result<Vec<SaeFeature>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(EfficacyError::upstream("sae", "model not loaded"));
        }
        Ok(self.features.clone())
    }
}
