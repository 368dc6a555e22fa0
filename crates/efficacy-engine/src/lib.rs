//! efficacy-engine: The Efficacy Orchestrator and its external collaborators.
//!
//! Fans sequence, pathway, and evidence signals out and back in for one
//! request, degrading on any collaborator failure, and returns a ranked panel.

pub mod collaborators;
pub mod evidence;
pub mod postprocess;
pub mod orchestrator;

pub use collaborators::Collaborators;
pub use evidence::{EvidenceBundle, EvidenceGatherer, EvidencePlan};
pub use orchestrator::EfficacyOrchestrator;
pub use postprocess::{PostProcessOutput, PostProcessor};
