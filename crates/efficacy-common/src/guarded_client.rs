use std::collections::HashSet;
use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::error::{EfficacyError, Result};

/// HTTP client that only talks to approved collaborator hosts.
///
/// Hosts come from the engine configuration plus a small default set of
/// public genomics services.
#[derive(Debug, Clone)]
pub struct GuardedClient {
    client: Client,
    allowlist: HashSet<String>,
}

const DEFAULT_DOMAINS: &[&str] = &[
    "rest.ensembl.org",        // Reference sequence windows
    "eutils.ncbi.nlm.nih.gov", // PubMed
    "www.ncbi.nlm.nih.gov",    // ClinVar
    "localhost",
    "127.0.0.1",
];

impl GuardedClient {
    /// Build a client allowing the default domains plus the hosts of `endpoints`.
    pub fn new(endpoints: &[String], timeout: Duration) -> Result<Self> {
        let mut allowlist: HashSet<String> = DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect();
        for endpoint in endpoints {
            match Url::parse(endpoint).ok().and_then(|u| u.host_str().map(str::to_string)) {
                Some(host) => {
                    allowlist.insert(host);
                }
                None => {
                    return Err(EfficacyError::Configuration(format!(
                        "collaborator endpoint is not a valid URL: {endpoint}"
                    )))
                }
            }
        }

        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| EfficacyError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Exact host match or subdomain of an allowed host.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) else {
            return false;
        };
        self.allowlist
            .iter()
            .any(|allowed| host == *allowed || host.ends_with(&format!(".{allowed}")))
    }

    fn check(&self, url: &str) -> Result<()> {
        if self.is_allowed(url) {
            Ok(())
        } else {
            Err(EfficacyError::Security(format!(
                "domain not in collaborator allowlist for URL {url}"
            )))
        }
    }

    /// POST a JSON body and decode a JSON reply. Non-2xx becomes
    /// [`EfficacyError::UpstreamUnavailable`] tagged with `service`.
    pub async fn post_json<B, T>(&self, service: &str, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.check(url)?;
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| EfficacyError::upstream(service, e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EfficacyError::upstream(service, format!("HTTP {}", status.as_u16())));
        }
        resp.json::<T>()
            .await
            .map_err(|e| EfficacyError::upstream(service, format!("malformed reply: {e}")))
    }

    /// GET a plain-text body.
    pub async fn get_text(&self, service: &str, url: &str, query: &[(&str, String)]) -> Result<String> {
        self.check(url)?;
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| EfficacyError::upstream(service, e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EfficacyError::upstream(service, format!("HTTP {}", status.as_u16())));
        }
        resp.text().await.map_err(|e| EfficacyError::upstream(service, e.to_string()))
    }
}
