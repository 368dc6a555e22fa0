//! External collaborators consumed by the orchestrator.
//!
//! Each concern is a trait with an HTTP implementation and a counting mock:
//!   LiteratureProvider  per-drug literature strength and citations
//!   ClinVarProvider     signed prior for the primary variant
//!   InsightsProvider    functionality / chromatin / essentiality / regulatory
//!   CohortProvider      cohort coverage per gene and disease
//!   CalibrationSource   confidence → calibrated percentile per drug
//!   SaeExtractor        sparse-autoencoder feature activations per variant
//!
//! Any of them may be absent or unavailable; callers degrade, never fail.

pub mod literature;
pub mod clinvar;
pub mod insights;
pub mod cohort;
pub mod calibration;
pub mod sae;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use efficacy_common::guarded_client::GuardedClient;
use efficacy_common::{EngineConfig, Result};

pub use calibration::{CalibrationSource, HttpCalibrationSource, MockCalibrationSource};
pub use clinvar::{ClinVarProvider, HttpClinVarProvider, MockClinVarProvider};
pub use cohort::{CohortProvider, HttpCohortProvider, MockCohortProvider};
pub use insights::{HttpInsightsProvider, InsightsProvider, MockInsightsProvider};
pub use literature::{HttpLiteratureProvider, LiteratureProvider, LiteratureQuery, MockLiteratureProvider};
pub use sae::{HttpSaeExtractor, MockSaeExtractor, SaeExtractor};

/// A single JSON POST endpoint behind the allow-listed client.
#[derive(Debug, Clone)]
pub(crate) struct Endpoint {
    client: GuardedClient,
    url: String,
    service: &'static str,
}

impl Endpoint {
    pub(crate) fn new(service: &'static str, url: &str, timeout: Duration) -> Result<Self> {
        let url = url.trim_end_matches('/').to_string();
        let client = GuardedClient::new(std::slice::from_ref(&url), timeout)?;
        Ok(Self { client, url, service })
    }

    pub(crate) async fn post<B, T>(&self, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.client.post_json(self.service, &self.url, body).await
    }
}

/// Every optional collaborator, shared across requests.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub literature: Option<Arc<dyn LiteratureProvider>>,
    pub clinvar: Option<Arc<dyn ClinVarProvider>>,
    pub insights: Option<Arc<dyn InsightsProvider>>,
    pub cohort: Option<Arc<dyn CohortProvider>>,
    pub calibration: Option<Arc<dyn CalibrationSource>>,
    pub sae: Option<Arc<dyn SaeExtractor>>,
}

impl Collaborators {
    /// HTTP collaborators for every configured URL; unconfigured ones stay absent.
    pub fn from_config(cfg: &EngineConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.scorers.request_timeout_secs);
        let ev = &cfg.evidence;
        let mut out = Self::default();
        if let Some(url) = &ev.literature_url {
            out.literature = Some(Arc::new(HttpLiteratureProvider::new(url, timeout)?));
        }
        if let Some(url) = &ev.clinvar_url {
            out.clinvar = Some(Arc::new(HttpClinVarProvider::new(url, timeout)?));
        }
        if let Some(url) = &ev.insights_url {
            out.insights = Some(Arc::new(HttpInsightsProvider::new(url, timeout)?));
        }
        if let Some(url) = &ev.cohort_url {
            out.cohort = Some(Arc::new(HttpCohortProvider::new(url, timeout)?));
        }
        if let Some(url) = &ev.calibration_url {
            out.calibration = Some(Arc::new(HttpCalibrationSource::new(url, timeout)?));
        }
        if let Some(url) = &ev.sae_url {
            out.sae = Some(Arc::new(HttpSaeExtractor::new(url, timeout)?));
        }
        Ok(out)
    }

    pub fn with_literature(mut self, p: Arc<dyn LiteratureProvider>) -> Self {
        self.literature = Some(p);
        self
    }

    pub fn with_clinvar(mut self, p: Arc<dyn ClinVarProvider>) -> Self {
        self.clinvar = Some(p);
        self
    }

    pub fn with_insights(mut self, p: Arc<dyn InsightsProvider>) -> Self {
        self.insights = Some(p);
        self
    }

    pub fn with_cohort(mut self, p: Arc<dyn CohortProvider>) -> Self {
        self.cohort = Some(p);
        self
    }

    pub fn with_calibration(mut self, p: Arc<dyn CalibrationSource>) -> Self {
        self.calibration = Some(p);
        self
    }

    pub fn with_sae(mut self, p: Arc<dyn SaeExtractor>) -> Self {
        self.sae = Some(p);
        self
    }
}
