//! Application error handling
//!
//! Every failure surfaces as a JSON `{ "error": ... }` body with a
//! conventional status code: 400 validation, 401 auth, 404 missing,
//! 502 upstream, 503 not configured.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use clinic_core::MappingError;
use medplum_client::MedplumError;

/// Application error type
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    ServiceUnavailable(String),
    BadGateway(String),
}

impl ApiError {
    /// A stored resource came back in a shape we cannot use; that is an
    /// upstream problem, not a caller problem.
    pub fn upstream_shape(err: MappingError) -> Self {
        Self::BadGateway(format!("upstream resource unusable: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "Request failed");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<MappingError> for ApiError {
    fn from(err: MappingError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<MedplumError> for ApiError {
    fn from(err: MedplumError) -> Self {
        match &err {
            MedplumError::Status { status: 404, .. } => {
                ApiError::NotFound("resource not found".to_string())
            }
            MedplumError::Status { status: 400, outcome } => ApiError::BadRequest(
                outcome
                    .as_ref()
                    .and_then(|o| o.first_message())
                    .unwrap_or("upstream rejected the resource")
                    .to_string(),
            ),
            _ => ApiError::BadGateway(err.to_string()),
        }
    }
}
