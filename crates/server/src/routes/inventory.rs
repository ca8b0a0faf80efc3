//! Dispensary inventory endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use clinic_core::fhir;
use clinic_core::inventory::{FORMULARY_SYSTEM, MedicationInput, MedicationRecord, StockAdjustment};
use medplum_client::SearchQuery;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/inventory - Register a stock item
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<MedicationInput>,
) -> Result<impl IntoResponse, ApiError> {
    let medication = input.to_fhir()?;
    let stored: fhir::Medication = state.medplum.create("Medication", &medication).await?;
    let record = MedicationRecord::from_fhir(&stored).map_err(ApiError::upstream_shape)?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub code: Option<String>,
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct StockList {
    pub items: Vec<MedicationRecord>,
}

/// GET /api/inventory - List stock, optionally filtered by formulary
/// code or name substring
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<StockList>, ApiError> {
    let query = SearchQuery::new()
        .maybe_param(
            "code",
            params.code.map(|c| format!("{}|{}", FORMULARY_SYSTEM, c)),
        )
        .maybe_param("code:text", params.name)
        .param("status", "active");

    let bundle = state.medplum.search("Medication", &query).await?;
    let items = bundle
        .resources::<fhir::Medication>("Medication")
        .iter()
        .filter_map(|m| MedicationRecord::from_fhir(m).ok())
        .collect();

    Ok(Json(StockList { items }))
}

/// GET /api/inventory/{id} - A single stock item
pub async fn read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MedicationRecord>, ApiError> {
    let medication: fhir::Medication = state.medplum.read("Medication", &id).await?;
    let record = MedicationRecord::from_fhir(&medication).map_err(ApiError::upstream_shape)?;
    Ok(Json(record))
}

/// PATCH /api/inventory/{id} - Adjust stock by a signed delta
pub async fn adjust(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(adjustment): Json<StockAdjustment>,
) -> Result<Json<MedicationRecord>, ApiError> {
    let current: fhir::Medication = state.medplum.read("Medication", &id).await?;
    let updated = adjustment.apply(&current)?;
    let stored: fhir::Medication = state.medplum.update("Medication", &id, &updated).await?;
    let record = MedicationRecord::from_fhir(&stored).map_err(ApiError::upstream_shape)?;
    Ok(Json(record))
}
