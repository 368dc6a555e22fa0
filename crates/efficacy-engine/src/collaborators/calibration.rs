use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use efficacy_common::entities::clamp_unit;
use efficacy_common::{EfficacyError, Result};

use super::Endpoint;

/// Maps a drug's raw confidence onto its historical confidence distribution.
#[async_trait]
pub trait CalibrationSource: Send + Sync {
    async fn percentile(&self, drug: &str, confidence: f64) -> Result<f64>;
}

#[derive(Serialize)]
struct CalibrationBody<'a> {
    drug: &'a str,
    confidence: f64,
}

#[derive(Deserialize)]
struct CalibrationReply {
    percentile: f64,
}

pub struct HttpCalibrationSource {
    endpoint: Endpoint,
}

impl HttpCalibrationSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self { endpoint: Endpoint::new("calibration", url, timeout)? })
    }
}

#[async_trait]
impl CalibrationSource for HttpCalibrationSource {
    async fn percentile(&self, drug: &str, confidence: f64) -> Result<f64> {
        let reply: CalibrationReply = self.endpoint.post(&CalibrationBody { drug, confidence }).await?;
        Ok(clamp_unit(reply.percentile))
    }
}

// ── Mock Implementation for Testing ────────────────────────────────────────

/// Returns the confidence itself as the percentile.
#[derive(Debug, Default)]
pub struct MockCalibrationSource {
    failing: bool,
    calls: AtomicUsize,
}

impl MockCalibrationSource {
    pub fn new() -> Self {
        Self::default()
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
impl CalibrationSource for MockCalibrationSource {
    async fn percentile(&self, _drug: &str, confidence: f64) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(EfficacyError::upstream("calibration", "no snapshot for drug"));
        }
        Ok(clamp_unit(confidence))
    }
}
