//! Appointment booking handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use clinic_core::appointment::{AppointmentInput, AppointmentRecord, AppointmentStatus};
use clinic_core::fhir;
use medplum_client::SearchQuery;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/appointments - Book a slot
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<AppointmentInput>,
) -> Result<impl IntoResponse, ApiError> {
    let resource = input.to_fhir()?;
    let stored: fhir::Appointment = state.medplum.create("Appointment", &resource).await?;
    let record = AppointmentRecord::from_fhir(&stored).map_err(ApiError::upstream_shape)?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/appointments/{}", record.id).parse() {
        headers.insert(header::LOCATION, location);
    }

    Ok((StatusCode::CREATED, headers, Json(record)))
}

/// GET /api/appointments/{id}
pub async fn read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AppointmentRecord>, ApiError> {
    let stored: fhir::Appointment = state.medplum.read("Appointment", &id).await?;
    let record = AppointmentRecord::from_fhir(&stored).map_err(ApiError::upstream_shape)?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub patient: Option<String>,
    /// A single day, e.g. 2026-03-05
    pub date: Option<String>,
}

#[derive(Serialize)]
pub struct AppointmentList {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    pub appointments: Vec<AppointmentRecord>,
}

/// GET /api/appointments - List by patient and/or day
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<AppointmentList>, ApiError> {
    if params.patient.is_none() && params.date.is_none() {
        return Err(ApiError::BadRequest(
            "patient or date query parameter is required".into(),
        ));
    }

    let query = SearchQuery::new()
        .maybe_param(
            "patient",
            params.patient.as_ref().map(|p| format!("Patient/{}", p)),
        )
        .maybe_param("date", params.date.clone())
        .sort("date");

    let bundle = state.medplum.search("Appointment", &query).await?;
    let appointments = bundle
        .resources::<fhir::Appointment>("Appointment")
        .iter()
        .filter_map(|a| AppointmentRecord::from_fhir(a).ok())
        .collect();

    Ok(Json(AppointmentList {
        total: bundle.total,
        appointments,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: AppointmentStatus,
}

/// PATCH /api/appointments/{id} - Front-desk status change
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<AppointmentRecord>, ApiError> {
    let mut appointment: fhir::Appointment = state.medplum.read("Appointment", &id).await?;
    appointment.status = update.status.as_str().to_string();

    let stored: fhir::Appointment = state.medplum.update("Appointment", &id, &appointment).await?;
    let record = AppointmentRecord::from_fhir(&stored).map_err(ApiError::upstream_shape)?;
    Ok(Json(record))
}
