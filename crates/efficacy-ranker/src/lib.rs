//! efficacy-ranker: Pathway aggregation and per-drug scoring.
//!
//! Sequence scores become a pathway map, and each drug in the disease panel is
//! scored against sequence, pathway, and evidence signals.

pub mod normalise;
pub mod pathway;
pub mod panel;
pub mod tier;
pub mod confidence;
pub mod drug_scorer;

pub use drug_scorer::{DrugScorer, DrugSignals};
pub use panel::PanelRegistry;
pub use pathway::PathwayAggregator;
