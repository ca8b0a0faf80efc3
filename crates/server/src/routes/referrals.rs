//! Referral handlers

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use clinic_core::fhir;
use clinic_core::referral::{ReferralInput, ReferralRecord};
use medplum_client::SearchQuery;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/referrals - Refer a patient out
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<ReferralInput>,
) -> Result<impl IntoResponse, ApiError> {
    let resource = input.to_fhir()?;
    let stored: fhir::ServiceRequest = state.medplum.create("ServiceRequest", &resource).await?;
    let record = ReferralRecord::from_fhir(&stored).map_err(ApiError::upstream_shape)?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/referrals/{}", record.id).parse() {
        headers.insert(header::LOCATION, location);
    }

    Ok((StatusCode::CREATED, headers, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub patient: Option<String>,
}

#[derive(Serialize)]
pub struct ReferralList {
    pub referrals: Vec<ReferralRecord>,
}

/// GET /api/referrals?patient= - A patient's outbound referrals
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ReferralList>, ApiError> {
    let patient = params
        .patient
        .ok_or_else(|| ApiError::BadRequest("patient query parameter is required".into()))?;

    let query = SearchQuery::new()
        .param("subject", format!("Patient/{}", patient))
        .param("category", format!("{}|3457005", fhir::SNOMED))
        .sort("-authored");

    let bundle = state.medplum.search("ServiceRequest", &query).await?;
    let referrals = bundle
        .resources::<fhir::ServiceRequest>("ServiceRequest")
        .iter()
        .filter(|r| ReferralRecord::is_referral(r))
        .filter_map(|r| ReferralRecord::from_fhir(r).ok())
        .collect();

    Ok(Json(ReferralList { referrals }))
}
