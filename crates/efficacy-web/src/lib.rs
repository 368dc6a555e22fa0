//! efficacy-web: HTTP surface for the Efficacy Orchestrator.
//!   - `POST /api/efficacy/predict` ranks a disease panel for a mutation set
//!   - `GET  /api/health` reports liveness and the known disease panels

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
