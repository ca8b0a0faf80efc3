//! Consultation handlers: visit creation with its FHIR fan-out, the
//! waiting-room queue, and status progression.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use clinic_core::consultation::{
    ConsultationInput, ConsultationRecord, ConsultationStatus, ConsultationSummary,
};
use clinic_core::fhir;
use medplum_client::SearchQuery;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CreatedConsultation {
    pub id: String,
    pub status: ConsultationStatus,
    pub condition_ids: Vec<String>,
    pub procedure_ids: Vec<String>,
    pub observation_ids: Vec<String>,
}

/// POST /api/consultations - Create a visit and its linked resources
///
/// The fan-out is sequential and best-effort: if a child create fails
/// after the Encounter exists, the caller gets a 502 naming the
/// Encounter so nothing is silently lost.
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<ConsultationInput>,
) -> Result<impl IntoResponse, ApiError> {
    let mut resources = input.to_fhir()?;

    let encounter: fhir::Encounter = state.medplum.create("Encounter", &resources.encounter).await?;
    let encounter_id = encounter
        .id
        .clone()
        .ok_or_else(|| ApiError::BadGateway("created Encounter has no id".into()))?;
    resources.link_encounter(&encounter_id);

    let partial = |what: &str, err: medplum_client::MedplumError| {
        tracing::error!(encounter_id = %encounter_id, error = %err, "Consultation fan-out failed at {}", what);
        ApiError::BadGateway(format!(
            "consultation {} was created but storing a linked {} failed: {}",
            encounter_id, what, err
        ))
    };

    let mut condition_ids = Vec::new();
    for condition in &resources.conditions {
        let stored: fhir::Condition = state
            .medplum
            .create("Condition", condition)
            .await
            .map_err(|e| partial("Condition", e))?;
        condition_ids.extend(stored.id);
    }

    let mut procedure_ids = Vec::new();
    for procedure in &resources.procedures {
        let stored: fhir::Procedure = state
            .medplum
            .create("Procedure", procedure)
            .await
            .map_err(|e| partial("Procedure", e))?;
        procedure_ids.extend(stored.id);
    }

    let mut observation_ids = Vec::new();
    for observation in &resources.observations {
        let stored: fhir::Observation = state
            .medplum
            .create("Observation", observation)
            .await
            .map_err(|e| partial("Observation", e))?;
        observation_ids.extend(stored.id);
    }

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/consultations/{}", encounter_id).parse() {
        headers.insert(header::LOCATION, location);
    }

    Ok((
        StatusCode::CREATED,
        headers,
        Json(CreatedConsultation {
            id: encounter_id,
            status: ConsultationStatus::Arrived,
            condition_ids,
            procedure_ids,
            observation_ids,
        }),
    ))
}

async fn linked<T: serde::de::DeserializeOwned>(
    state: &AppState,
    resource_type: &str,
    encounter_id: &str,
) -> Result<Vec<T>, ApiError> {
    let query = SearchQuery::new().param("encounter", format!("Encounter/{}", encounter_id));
    let bundle = state.medplum.search(resource_type, &query).await?;
    Ok(bundle.resources(resource_type))
}

/// GET /api/consultations/{id} - Recompose the full consultation view
pub async fn read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConsultationRecord>, ApiError> {
    let encounter: fhir::Encounter = state.medplum.read("Encounter", &id).await?;

    let conditions: Vec<fhir::Condition> = linked(&state, "Condition", &id).await?;
    let procedures: Vec<fhir::Procedure> = linked(&state, "Procedure", &id).await?;
    let observations: Vec<fhir::Observation> = linked(&state, "Observation", &id).await?;

    let record =
        ConsultationRecord::from_fhir(&encounter, &conditions, &procedures, &observations)
            .map_err(ApiError::upstream_shape)?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub patient: Option<String>,
    #[serde(rename = "_count")]
    pub count: Option<i64>,
}

#[derive(Serialize)]
pub struct ConsultationList {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    pub consultations: Vec<ConsultationSummary>,
}

/// GET /api/consultations?patient= - List a patient's visits
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ConsultationList>, ApiError> {
    let patient = params
        .patient
        .ok_or_else(|| ApiError::BadRequest("patient query parameter is required".into()))?;

    let mut query = SearchQuery::new()
        .param("subject", format!("Patient/{}", patient))
        .sort("-date");
    if let Some(count) = params.count {
        query = query.count(count);
    }

    let bundle = state.medplum.search("Encounter", &query).await?;
    let consultations = bundle
        .resources::<fhir::Encounter>("Encounter")
        .iter()
        .filter_map(ConsultationSummary::from_fhir)
        .collect();

    Ok(Json(ConsultationList {
        total: bundle.total,
        consultations,
    }))
}

#[derive(Serialize)]
pub struct QueueView {
    pub queue: Vec<ConsultationSummary>,
}

/// GET /api/consultations/queue - Today's waiting room, arrival order
pub async fn queue(State(state): State<AppState>) -> Result<Json<QueueView>, ApiError> {
    let today = Utc::now().date_naive();
    let query = SearchQuery::new()
        .param("status", "arrived,in-progress")
        .param("date", format!("ge{}", today))
        .sort("date");

    let bundle = state.medplum.search("Encounter", &query).await?;
    let mut queue: Vec<ConsultationSummary> = bundle
        .resources::<fhir::Encounter>("Encounter")
        .iter()
        .filter_map(ConsultationSummary::from_fhir)
        .collect();
    queue.sort_by_key(|e| e.started_at);

    Ok(Json(QueueView { queue }))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: ConsultationStatus,
}

#[derive(Serialize)]
pub struct UpdatedStatus {
    pub id: String,
    pub status: ConsultationStatus,
}

/// PATCH /api/consultations/{id}/status - Move a visit through the queue
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<UpdatedStatus>, ApiError> {
    let mut encounter: fhir::Encounter = state.medplum.read("Encounter", &id).await?;

    let current = ConsultationStatus::parse(&encounter.status).ok_or_else(|| {
        ApiError::BadGateway(format!(
            "stored encounter has unrecognized status {:?}",
            encounter.status
        ))
    })?;

    if !current.can_transition_to(update.status) {
        return Err(ApiError::BadRequest(format!(
            "cannot move consultation from {} to {}",
            current.as_str(),
            update.status.as_str()
        )));
    }

    encounter.status = update.status.as_str().to_string();
    if update.status.is_final() {
        let period = encounter.period.get_or_insert_with(Default::default);
        period.end = Some(Utc::now());
    }

    let _: fhir::Encounter = state.medplum.update("Encounter", &id, &encounter).await?;

    Ok(Json(UpdatedStatus {
        id,
        status: update.status,
    }))
}
