use thiserror::Error;

/// Error taxonomy for the efficacy engine.
///
/// Only [`EfficacyError::Configuration`] is fatal at request level. Every other
/// variant is a soft failure that callers convert into a substitute default plus
/// a provenance entry.
#[derive(Debug, Error)]
pub enum EfficacyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Upstream unavailable ({service}): {reason}")]
    UpstreamUnavailable { service: String, reason: String },

    #[error("Timed out during {stage} after {elapsed_ms}ms")]
    Timeout { stage: String, elapsed_ms: u64 },

    #[error("Invalid variant: {0}")]
    InvalidVariant(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EfficacyError {
    pub fn upstream(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// True when the caller should substitute a default instead of failing.
    pub fn is_soft(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, EfficacyError>;
