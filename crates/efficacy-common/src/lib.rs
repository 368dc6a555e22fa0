//! efficacy-common: Shared entities, errors, and configuration used across the
//! efficacy engine crates.

pub mod error;
pub mod entities;
pub mod request;
pub mod provenance;
pub mod outcome;
pub mod config;
pub mod guarded_client;

// Re-export commonly used types
pub use config::EngineConfig;
pub use entities::{
    Badge, Citation, ClinVarClassification, ClinVarPrior, DrugConfig, DrugScoreResult,
    EvidenceResult, EvidenceTier, ImpactLevel, InsightScores, PathwayScoreMap, Rationale,
    ScoringMode, ScoringStrategy, SeqScore, Variant,
};
pub use error::{EfficacyError, Result};
pub use outcome::Gathered;
pub use provenance::{FallbackReason, Provenance};
pub use request::{AblationMode, EfficacyOptions, EfficacyRequest, EfficacyResponse};
