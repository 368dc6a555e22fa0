//! Engine errors as HTTP responses.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

use efficacy_common::EfficacyError;

/// Error returned by API handlers; renders as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub EfficacyError);

impl From<EfficacyError> for ApiError {
    fn from(err: EfficacyError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EfficacyError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            EfficacyError::InvalidVariant(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.0.to_string();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %message, "Request failed");
        }

        let body = serde_json::json!({ "error": message });
        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            serde_json::to_string(&body).unwrap_or_else(|_| "{\"error\":\"Internal error\"}".to_string()),
        )
            .into_response()
    }
}
