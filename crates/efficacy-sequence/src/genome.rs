//! Reference-sequence windows for real-context scoring.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use efficacy_common::entities::Assembly;
use efficacy_common::guarded_client::GuardedClient;
use efficacy_common::{EfficacyError, Result};

#[async_trait]
pub trait GenomeWindowSource: Send + Sync {
    /// Forward-strand bases for the 1-based inclusive range `start..=end`.
    async fn fetch_window(&self, assembly: Assembly, chrom: &str, start: u64, end: u64) -> Result<String>;
}

/// Ensembl REST `sequence/region` client.
pub struct EnsemblGenomeSource {
    client: GuardedClient,
    base_url: String,
}

impl EnsemblGenomeSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = GuardedClient::new(std::slice::from_ref(&base_url), timeout)?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl GenomeWindowSource for EnsemblGenomeSource {
    #[instrument(skip(self))]
    async fn fetch_window(&self, assembly: Assembly, chrom: &str, start: u64, end: u64) -> Result<String> {
        let url = format!("{}/sequence/region/human/{chrom}:{start}..{end}:1", self.base_url);
        let query = [
            ("content-type", "text/plain".to_string()),
            ("coord_system_version", assembly.as_str().to_string()),
        ];
        let seq = self.client.get_text("genome_window", &url, &query).await?;
        let seq: String = seq.split_whitespace().collect::<String>().to_uppercase();
        debug!(len = seq.len(), "Fetched reference window");
        if seq.is_empty() {
            return Err(EfficacyError::upstream("genome_window", "empty sequence"));
        }
        Ok(seq)
    }
}

/// Replace `ref_allele` at `offset` with `alt_allele`. `None` if the reference
/// does not match the window at that offset.
pub fn substitute_allele(window: &str, offset: usize, ref_allele: &str, alt_allele: &str) -> Option<String> {
    let end = offset.checked_add(ref_allele.len())?;
    let observed = window.get(offset..end)?;
    if !observed.eq_ignore_ascii_case(ref_allele) {
        return None;
    }
    let mut out = String::with_capacity(window.len() + alt_allele.len());
    out.push_str(&window[..offset]);
    out.push_str(&alt_allele.to_uppercase());
    out.push_str(&window[end..]);
    Some(out)
}

// ── Mock Implementation for Testing ────────────────────────────────────────

/// Serves windows cut from registered per-chromosome sequences (1-based).
#[derive(Debug, Default)]
pub struct MockGenomeSource {
    chromosomes: HashMap<String, String>,
    calls: AtomicUsize,
}

impl MockGenomeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, chrom: &str, sequence: &str) -> Self {
        self.chromosomes.insert(chrom.to_string(), sequence.to_uppercase());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenomeWindowSource for MockGenomeSource {
    async fn fetch_window(&self, _assembly: Assembly, chrom: &str, start: u64, end: u64) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let seq = self
            .chromosomes
            .get(chrom)
            .ok_or_else(|| EfficacyError::upstream("genome_window", format!("unknown region {chrom}")))?;
        let from = start.saturating_sub(1) as usize;
        let to = (end as usize).min(seq.len());
        seq.get(from..to)
            .map(str::to_string)
            .ok_or_else(|| EfficacyError::upstream("genome_window", "region out of bounds"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_substitute_allele() {
        assert_eq!(substitute_allele("ACGTAC", 2, "G", "T").as_deref(), Some("ACTTAC"));
        assert_eq!(substitute_allele("ACGTAC", 2, "A", "T"), None);
        assert_eq!(substitute_allele("ACG", 3, "A", "T"), None);
    }

    #[tokio::test]
    async fn test_mock_window_is_one_based() {
        let src = MockGenomeSource::new().with("7", "AACCGGTT");
        let w = src.fetch_window(Assembly::GRCh38, "7", 3, 5).await.unwrap();
        assert_eq!(w, "CCG");
    }

    #[tokio::test]
    async fn test_ensembl_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sequence/region/human/7:100..105:1"))
            .and(query_param("coord_system_version", "GRCh38"))
            .respond_with(ResponseTemplate::new(200).set_body_string("acgtac\n"))
            .mount(&server)
            .await;

        let src = EnsemblGenomeSource::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let seq = src.fetch_window(Assembly::GRCh38, "7", 100, 105).await.unwrap();
        assert_eq!(seq, "ACGTAC");
    }
}
