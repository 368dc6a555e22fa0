//! Shared application state for the web server.

use std::sync::Arc;

use efficacy_engine::EfficacyOrchestrator;

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub orchestrator: EfficacyOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: EfficacyOrchestrator) -> Self {
        Self { orchestrator }
    }
}

pub type SharedState = Arc<AppState>;
