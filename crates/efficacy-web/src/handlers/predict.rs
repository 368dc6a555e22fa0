//! Efficacy prediction endpoint.

use axum::{extract::State, Json};
use tracing::info;

use efficacy_common::{EfficacyRequest, EfficacyResponse};

use crate::error::ApiError;
use crate::state::SharedState;

/// POST /api/efficacy/predict
pub async fn predict(
    State(state): State<SharedState>,
    Json(req): Json<EfficacyRequest>,
) -> Result<Json<EfficacyResponse>, ApiError> {
    info!(
        model_id = %req.model_id,
        disease = %req.disease,
        mutations = req.mutations.len(),
        "Predict request"
    );
    let response = state.orchestrator.predict(&req).await?;
    Ok(Json(response))
}
