//! Billing endpoints

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use clinic_core::billing::{ChargeInput, ChargeRecord, InvoiceSummary};
use clinic_core::fhir;
use medplum_client::SearchQuery;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/billing/charges - Record a billable charge
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<ChargeInput>,
) -> Result<impl IntoResponse, ApiError> {
    let charge = input.to_fhir()?;
    let stored: fhir::ChargeItem = state.medplum.create("ChargeItem", &charge).await?;
    let record = ChargeRecord::from_fhir(&stored).map_err(ApiError::upstream_shape)?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub patient: Option<String>,
    pub encounter: Option<String>,
}

#[derive(Serialize)]
pub struct ChargeList {
    pub charges: Vec<ChargeRecord>,
    pub invoice: InvoiceSummary,
}

/// GET /api/billing/charges?patient= or ?encounter= - Charges plus an
/// invoice summary of the returned lines
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ChargeList>, ApiError> {
    if params.patient.is_none() && params.encounter.is_none() {
        return Err(ApiError::BadRequest(
            "patient or encounter query parameter is required".into(),
        ));
    }

    let query = SearchQuery::new()
        .maybe_param(
            "subject",
            params.patient.map(|id| format!("Patient/{}", id)),
        )
        .maybe_param(
            "context",
            params.encounter.map(|id| format!("Encounter/{}", id)),
        )
        .sort("-occurrence");

    let bundle = state.medplum.search("ChargeItem", &query).await?;
    let charges: Vec<ChargeRecord> = bundle
        .resources::<fhir::ChargeItem>("ChargeItem")
        .iter()
        .filter_map(|c| ChargeRecord::from_fhir(c).ok())
        .collect();
    let invoice = InvoiceSummary::of(&charges);

    Ok(Json(ChargeList { charges, invoice }))
}
