//! Imaging order routing and the PACS study webhook

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use clinic_core::fhir::{self, Reference};
use clinic_core::imaging::{ImagingOrderInput, ImagingReceiveInput, ImagingStudyRecord};
use clinic_core::lab::ACCESSION_SYSTEM;
use medplum_client::SearchQuery;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CreatedOrder {
    pub accession: String,
    pub order_id: String,
}

/// POST /api/imaging/orders - Route an order to the imaging service
pub async fn create_order(
    State(state): State<AppState>,
    Json(input): Json<ImagingOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let accession = format!("IMG-{}", Uuid::new_v4().simple());
    let request = input.to_fhir(&accession)?;

    let stored: fhir::ServiceRequest = state.medplum.create("ServiceRequest", &request).await?;
    let order_id = stored
        .id
        .ok_or_else(|| ApiError::BadGateway("created ServiceRequest has no id".into()))?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedOrder {
            accession,
            order_id,
        }),
    ))
}

#[derive(Serialize)]
pub struct ReceivedStudy {
    pub study_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    pub linked_order_ids: Vec<String>,
}

/// POST /api/imaging/receive - PACS webhook
pub async fn receive(
    State(state): State<AppState>,
    Json(input): Json<ImagingReceiveInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (mut study, mut report) = input.to_fhir()?;

    // Link study and read back to the ordering ServiceRequest by accession.
    let mut linked_order_ids = Vec::new();
    if let Some(ref accession) = input.accession {
        let query =
            SearchQuery::new().param("identifier", format!("{}|{}", ACCESSION_SYSTEM, accession));
        let bundle = state.medplum.search("ServiceRequest", &query).await?;

        for mut order in bundle.resources::<fhir::ServiceRequest>("ServiceRequest") {
            let Some(order_id) = order.id.clone() else {
                continue;
            };
            let order_ref = Reference::local("ServiceRequest", &order_id);
            study.based_on.push(order_ref.clone());
            if let Some(ref mut report) = report {
                report.based_on.push(order_ref);
            }

            order.status = "completed".into();
            if let Err(err) = state
                .medplum
                .update::<_, fhir::ServiceRequest>("ServiceRequest", &order_id, &order)
                .await
            {
                tracing::warn!(order_id = %order_id, error = %err, "Failed to mark imaging order completed");
            }
            linked_order_ids.push(order_id);
        }
        if linked_order_ids.is_empty() {
            tracing::warn!(accession = %accession, "Imaging study received for unknown accession, storing unlinked");
        }
    }

    let stored: fhir::ImagingStudy = state.medplum.create("ImagingStudy", &study).await?;
    let study_id = stored
        .id
        .ok_or_else(|| ApiError::BadGateway("created ImagingStudy has no id".into()))?;

    let report_id = match report {
        Some(report) => {
            let stored: fhir::DiagnosticReport =
                state.medplum.create("DiagnosticReport", &report).await?;
            stored.id
        }
        None => None,
    };

    Ok((
        StatusCode::CREATED,
        Json(ReceivedStudy {
            study_id,
            report_id,
            linked_order_ids,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub patient: Option<String>,
}

#[derive(Serialize)]
pub struct StudyList {
    pub studies: Vec<ImagingStudyRecord>,
}

/// GET /api/imaging/studies?patient= - A patient's imaging studies
pub async fn list_studies(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<StudyList>, ApiError> {
    let patient = params
        .patient
        .ok_or_else(|| ApiError::BadRequest("patient query parameter is required".into()))?;

    let query = SearchQuery::new()
        .param("subject", format!("Patient/{}", patient))
        .sort("-started");

    let bundle = state.medplum.search("ImagingStudy", &query).await?;
    let studies = bundle
        .resources::<fhir::ImagingStudy>("ImagingStudy")
        .iter()
        .filter_map(|s| ImagingStudyRecord::from_fhir(s).ok())
        .collect();

    Ok(Json(StudyList { studies }))
}
