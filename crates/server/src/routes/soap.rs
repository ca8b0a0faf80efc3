//! AI-assisted SOAP note rewriting

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use clinic_core::consultation::SoapNote;

use crate::ai::soap;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RewriteRequest {
    pub text: String,
    #[serde(default)]
    pub style: Option<String>,
}

#[derive(Serialize)]
pub struct RewriteResponse {
    pub note: SoapNote,
}

/// POST /api/soap-rewrite - Turn a free-text note into SOAP sections
pub async fn rewrite(
    State(state): State<AppState>,
    Json(request): Json<RewriteRequest>,
) -> Result<Json<RewriteResponse>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".into()));
    }

    let Some(ref ai) = state.ai else {
        return Err(ApiError::ServiceUnavailable(
            "AI rewriting is not configured".into(),
        ));
    };

    let note = soap::rewrite(ai, &request.text, request.style.as_deref())
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "SOAP rewrite failed");
            ApiError::BadGateway(format!("AI provider error: {}", err))
        })?;

    Ok(Json(RewriteResponse { note }))
}
