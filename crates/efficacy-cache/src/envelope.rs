//! Versioned (de)serialization boundary between typed payloads and the
//! string-valued store.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use efficacy_common::Result;

/// A payload type that may be stored in the cache.
///
/// Bump `VERSION` whenever the serialized shape changes; stale entries are then
/// read as misses instead of failing to decode later.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync {
    const KIND: &'static str;
    const VERSION: u32;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEnvelope<T> {
    pub kind: String,
    pub version: u32,
    pub payload: T,
}

impl<T: Cacheable> CacheEnvelope<T> {
    pub fn encode(payload: &T) -> Result<String>
    where
        T: Clone,
    {
        let env = CacheEnvelope {
            kind: T::KIND.to_string(),
            version: T::VERSION,
            payload: payload.clone(),
        };
        Ok(serde_json::to_string(&env)?)
    }

    /// Decode, treating kind/version mismatch or malformed JSON as a miss.
    pub fn decode(raw: &str) -> Option<T> {
        let env: CacheEnvelope<serde_json::Value> = match serde_json::from_str(raw) {
            Ok(env) => env,
            Err(e) => {
                debug!(error = %e, "Discarding malformed cache entry");
                return None;
            }
        };
        if env.kind != T::KIND || env.version != T::VERSION {
            debug!(
                kind = %env.kind,
                version = env.version,
                expected_kind = T::KIND,
                expected_version = T::VERSION,
                "Discarding cache entry with stale schema"
            );
            return None;
        }
        serde_json::from_value(env.payload).ok()
    }
}

impl Cacheable for efficacy_common::EvidenceResult {
    const KIND: &'static str = "evidence";
    const VERSION: u32 = 1;
}
