//! Lab order routing and the POCT result webhook

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use clinic_core::fhir::{self, Reference};
use clinic_core::lab::{
    ACCESSION_SYSTEM, LabOrderInput, LabReceiveInput, LabReportRecord, LabValue,
};
use medplum_client::SearchQuery;

use crate::error::ApiError;
use crate::state::AppState;

fn new_accession(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

#[derive(Serialize)]
pub struct CreatedOrder {
    pub accession: String,
    pub order_ids: Vec<String>,
}

/// POST /api/labs/orders - Route an order to the lab
pub async fn create_order(
    State(state): State<AppState>,
    Json(input): Json<LabOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let accession = new_accession("LAB");
    let requests = input.to_fhir(&accession)?;

    let mut order_ids = Vec::new();
    for request in &requests {
        let stored: fhir::ServiceRequest = state.medplum.create("ServiceRequest", request).await?;
        order_ids.extend(stored.id);
    }

    Ok((
        StatusCode::CREATED,
        Json(CreatedOrder {
            accession,
            order_ids,
        }),
    ))
}

/// Find open orders carrying the given accession.
async fn orders_for_accession(
    state: &AppState,
    accession: &str,
) -> Result<Vec<fhir::ServiceRequest>, ApiError> {
    let query =
        SearchQuery::new().param("identifier", format!("{}|{}", ACCESSION_SYSTEM, accession));
    let bundle = state.medplum.search("ServiceRequest", &query).await?;
    Ok(bundle.resources("ServiceRequest"))
}

#[derive(Serialize)]
pub struct ReceivedResult {
    pub report_id: String,
    pub observation_ids: Vec<String>,
    /// Orders matched by accession; empty when the result arrived unlinked
    pub linked_order_ids: Vec<String>,
}

/// POST /api/labs/receive - POCT webhook
///
/// Results for an unknown accession are accepted and stored unlinked;
/// a device must never have its data bounced.
pub async fn receive(
    State(state): State<AppState>,
    Json(input): Json<LabReceiveInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (mut report, observations) = input.to_fhir()?;

    let mut observation_ids = Vec::new();
    for observation in &observations {
        let stored: fhir::Observation = state.medplum.create("Observation", observation).await?;
        observation_ids.extend(stored.id);
    }
    report.result = observation_ids
        .iter()
        .map(|id| Reference::local("Observation", id))
        .collect();

    // Link back to the ordering ServiceRequests and close them out.
    let mut linked_order_ids = Vec::new();
    if let Some(ref accession) = input.accession {
        for mut order in orders_for_accession(&state, accession).await? {
            let Some(order_id) = order.id.clone() else {
                continue;
            };
            report
                .based_on
                .push(Reference::local("ServiceRequest", &order_id));

            order.status = "completed".into();
            if let Err(err) = state
                .medplum
                .update::<_, fhir::ServiceRequest>("ServiceRequest", &order_id, &order)
                .await
            {
                tracing::warn!(order_id = %order_id, error = %err, "Failed to mark lab order completed");
            }
            linked_order_ids.push(order_id);
        }
        if linked_order_ids.is_empty() {
            tracing::warn!(accession = %accession, "Lab result received for unknown accession, storing unlinked");
        }
    }

    let stored: fhir::DiagnosticReport = state.medplum.create("DiagnosticReport", &report).await?;
    let report_id = stored
        .id
        .ok_or_else(|| ApiError::BadGateway("created DiagnosticReport has no id".into()))?;

    Ok((
        StatusCode::CREATED,
        Json(ReceivedResult {
            report_id,
            observation_ids,
            linked_order_ids,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub patient: Option<String>,
}

#[derive(Serialize)]
pub struct ReportList {
    pub reports: Vec<LabReportRecord>,
}

/// GET /api/labs/results?patient= - A patient's lab reports
pub async fn list_results(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ReportList>, ApiError> {
    let patient = params
        .patient
        .ok_or_else(|| ApiError::BadRequest("patient query parameter is required".into()))?;

    let query = SearchQuery::new()
        .param("subject", format!("Patient/{}", patient))
        .param("category", "LAB")
        .sort("-issued");

    let bundle = state.medplum.search("DiagnosticReport", &query).await?;
    let reports = bundle
        .resources::<fhir::DiagnosticReport>("DiagnosticReport")
        .iter()
        .filter_map(|r| LabReportRecord::from_fhir(r).ok())
        .collect();

    Ok(Json(ReportList { reports }))
}

#[derive(Serialize)]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: LabReportRecord,
    pub values: Vec<LabValue>,
}

/// GET /api/labs/results/{id} - One report with its analyte values
pub async fn read_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReportDetail>, ApiError> {
    let stored: fhir::DiagnosticReport = state.medplum.read("DiagnosticReport", &id).await?;
    let report = LabReportRecord::from_fhir(&stored).map_err(ApiError::upstream_shape)?;

    let mut values = Vec::new();
    for observation_id in &report.observation_ids {
        match state
            .medplum
            .read::<fhir::Observation>("Observation", observation_id)
            .await
        {
            Ok(observation) => values.push(LabValue::from_fhir(&observation)),
            Err(err) => {
                tracing::warn!(observation_id = %observation_id, error = %err, "Skipping unreadable member observation");
            }
        }
    }

    Ok(Json(ReportDetail { report, values }))
}
