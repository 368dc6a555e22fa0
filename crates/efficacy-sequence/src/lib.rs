//! efficacy-sequence: Variant-effect scorers and the priority fallback chain
//! that picks exactly one of them per mutation set.
//!
//! Chain order: fusion → adaptive ensemble → large context → empty.

pub mod backend;
pub mod mechanistic;
pub mod genome;
pub mod calibration;
pub mod scorer;
pub mod fusion;
pub mod ensemble;
pub mod large_context;
pub mod processor;

pub use processor::{SequenceOutcome, SequenceProcessor};
pub use scorer::{ScoreOptions, SequenceScorer};
