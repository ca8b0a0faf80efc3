//! Patient registration and search handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use clinic_core::fhir;
use clinic_core::patient::{PatientInput, PatientRecord, PatientUpdate};
use medplum_client::SearchQuery;

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for patient search
#[derive(Debug, Deserialize, Default)]
pub struct SearchParams {
    pub name: Option<String>,
    pub identifier: Option<String>,
    pub gender: Option<String>,
    pub birthdate: Option<String>,
    #[serde(rename = "_count")]
    pub count: Option<i64>,
    #[serde(rename = "_offset")]
    pub offset: Option<i64>,
}

impl SearchParams {
    fn to_query(&self) -> SearchQuery {
        let mut query = SearchQuery::new()
            .maybe_param("name", self.name.clone())
            .maybe_param("gender", self.gender.clone())
            .maybe_param("birthdate", self.birthdate.clone());
        if let Some(ref mrn) = self.identifier {
            query = query.param(
                "identifier",
                format!("{}|{}", clinic_core::patient::MRN_SYSTEM, mrn),
            );
        }
        if let Some(count) = self.count {
            query = query.count(count);
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        query
    }
}

#[derive(Serialize)]
pub struct PatientList {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    pub patients: Vec<PatientRecord>,
}

/// POST /api/patients - Register a new patient
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<PatientInput>,
) -> Result<impl IntoResponse, ApiError> {
    let resource = input.to_fhir()?;
    let stored: fhir::Patient = state.medplum.create("Patient", &resource).await?;
    let record = PatientRecord::from_fhir(&stored).map_err(ApiError::upstream_shape)?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/patients/{}", record.id).parse() {
        headers.insert(header::LOCATION, location);
    }

    Ok((StatusCode::CREATED, headers, Json(record)))
}

/// GET /api/patients/{id} - Read one patient
pub async fn read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PatientRecord>, ApiError> {
    let stored: fhir::Patient = state.medplum.read("Patient", &id).await?;
    let record = PatientRecord::from_fhir(&stored).map_err(ApiError::upstream_shape)?;
    Ok(Json(record))
}

/// PATCH /api/patients/{id} - Update demographics
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<PatientUpdate>,
) -> Result<Json<PatientRecord>, ApiError> {
    if update.is_empty() {
        return Err(ApiError::BadRequest("no fields to update".into()));
    }

    let current: fhir::Patient = state.medplum.read("Patient", &id).await?;
    let updated = update.apply(&current)?;
    let stored: fhir::Patient = state.medplum.update("Patient", &id, &updated).await?;
    let record = PatientRecord::from_fhir(&stored).map_err(ApiError::upstream_shape)?;
    Ok(Json(record))
}

/// GET /api/patients - Search patients
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<PatientList>, ApiError> {
    let bundle = state.medplum.search("Patient", &params.to_query()).await?;

    let patients = bundle
        .resources::<fhir::Patient>("Patient")
        .iter()
        .filter_map(|p| PatientRecord::from_fhir(p).ok())
        .collect();

    Ok(Json(PatientList {
        total: bundle.total,
        patients,
    }))
}
