//! Imaging order and study mapping
//!
//! Orders become imaging ServiceRequests; the PACS webhook delivers a
//! completed study which becomes an ImagingStudy plus, when a radiology
//! read is attached, a DiagnosticReport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MappingError;
use crate::fhir::{self, CodeableConcept, Coding, Identifier, Reference};
use crate::lab::ACCESSION_SYSTEM;

/// SNOMED code for the imaging category.
const IMAGING_CATEGORY_CODE: &str = "363679005";

const MODALITIES: [&str; 8] = ["CR", "DX", "US", "CT", "MR", "MG", "NM", "XA"];

/// Payload accepted by POST /api/imaging/orders
#[derive(Debug, Clone, Deserialize)]
pub struct ImagingOrderInput {
    pub patient_id: String,
    #[serde(default)]
    pub encounter_id: Option<String>,
    #[serde(default)]
    pub practitioner_id: Option<String>,
    /// DICOM modality code, e.g. CR, US, CT
    pub modality: String,
    pub description: String,
    #[serde(default)]
    pub priority: Option<String>,
}

impl ImagingOrderInput {
    pub fn to_fhir(&self, accession: &str) -> Result<fhir::ServiceRequest, MappingError> {
        if self.patient_id.trim().is_empty() {
            return Err(MappingError::MissingField("patient_id"));
        }
        if self.description.trim().is_empty() {
            return Err(MappingError::MissingField("description"));
        }
        if !MODALITIES.contains(&self.modality.as_str()) {
            return Err(MappingError::invalid(
                "modality",
                format!("must be one of {:?}", MODALITIES),
            ));
        }

        let mut request = fhir::ServiceRequest::new();
        request.identifier = vec![Identifier::new(ACCESSION_SYSTEM, accession)];
        request.status = "active".into();
        request.intent = "order".into();
        request.category = vec![CodeableConcept::coded(
            fhir::SNOMED,
            IMAGING_CATEGORY_CODE,
            "Imaging",
        )];
        request.priority = self.priority.clone();
        request.code = Some(CodeableConcept {
            coding: vec![Coding::new(fhir::DICOM_MODALITY, &self.modality, &self.modality)],
            text: Some(self.description.clone()),
        });
        request.subject = Some(Reference::local("Patient", &self.patient_id));
        request.encounter = self
            .encounter_id
            .as_ref()
            .map(|id| Reference::local("Encounter", id));
        request.requester = self
            .practitioner_id
            .as_ref()
            .map(|id| Reference::local("Practitioner", id));
        request.authored_on = Some(Utc::now());
        Ok(request)
    }
}

/// Payload accepted by POST /api/imaging/receive (PACS webhook)
#[derive(Debug, Clone, Deserialize)]
pub struct ImagingReceiveInput {
    #[serde(default)]
    pub accession: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    pub modality: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub series_count: Option<u32>,
    #[serde(default)]
    pub instance_count: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    /// Radiologist read, when the PACS sends one along
    #[serde(default)]
    pub report_text: Option<String>,
}

impl ImagingReceiveInput {
    pub fn to_fhir(
        &self,
    ) -> Result<(fhir::ImagingStudy, Option<fhir::DiagnosticReport>), MappingError> {
        if !MODALITIES.contains(&self.modality.as_str()) {
            return Err(MappingError::invalid(
                "modality",
                format!("must be one of {:?}", MODALITIES),
            ));
        }

        let subject = self
            .patient_id
            .as_ref()
            .map(|id| Reference::local("Patient", id));

        let mut study = fhir::ImagingStudy::new();
        if let Some(ref accession) = self.accession {
            study.identifier = vec![Identifier::new(ACCESSION_SYSTEM, accession)];
        }
        study.status = "available".into();
        study.modality = vec![Coding::new(fhir::DICOM_MODALITY, &self.modality, &self.modality)];
        study.subject = subject.clone();
        study.started = self.started_at;
        study.number_of_series = self.series_count;
        study.number_of_instances = self.instance_count;
        study.description = self.description.clone();

        let report = self.report_text.as_ref().map(|text| {
            let mut report = fhir::DiagnosticReport::new();
            if let Some(ref accession) = self.accession {
                report.identifier = vec![Identifier::new(ACCESSION_SYSTEM, accession)];
            }
            report.status = "final".into();
            report.category = vec![CodeableConcept::coded(
                "http://terminology.hl7.org/CodeSystem/v2-0074",
                "RAD",
                "Radiology",
            )];
            report.code = CodeableConcept::text(
                self.description.as_deref().unwrap_or("Imaging report"),
            );
            report.subject = subject;
            report.effective_date_time = self.started_at;
            report.issued = Some(Utc::now());
            report.conclusion = Some(text.clone());
            report
        });

        Ok((study, report))
    }
}

/// Application view of a stored imaging study
#[derive(Debug, Clone, Serialize)]
pub struct ImagingStudyRecord {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession: Option<String>,
    pub modality: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ImagingStudyRecord {
    pub fn from_fhir(study: &fhir::ImagingStudy) -> Result<Self, MappingError> {
        let id = study.id.clone().ok_or(MappingError::MissingField("id"))?;
        Ok(Self {
            id,
            status: study.status.clone(),
            accession: study
                .identifier
                .iter()
                .find(|i| i.system.as_deref() == Some(ACCESSION_SYSTEM))
                .and_then(|i| i.value.clone()),
            modality: study
                .modality
                .first()
                .and_then(|m| m.code.clone())
                .unwrap_or_default(),
            patient_id: study
                .subject
                .as_ref()
                .and_then(|s| s.id())
                .map(str::to_string),
            started_at: study.started,
            series_count: study.number_of_series,
            instance_count: study.number_of_instances,
            description: study.description.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receive() -> ImagingReceiveInput {
        ImagingReceiveInput {
            accession: Some("IMG-7".into()),
            patient_id: Some("p-1".into()),
            modality: "CR".into(),
            started_at: None,
            series_count: Some(1),
            instance_count: Some(2),
            description: Some("Chest X-ray PA".into()),
            report_text: Some("No focal consolidation.".into()),
        }
    }

    #[test]
    fn order_shapes_into_imaging_service_request() {
        let order = ImagingOrderInput {
            patient_id: "p-1".into(),
            encounter_id: None,
            practitioner_id: Some("dr-2".into()),
            modality: "US".into(),
            description: "Abdominal ultrasound".into(),
            priority: None,
        };
        let json = serde_json::to_value(order.to_fhir("IMG-9").unwrap()).unwrap();
        assert_eq!(json["category"][0]["coding"][0]["code"], IMAGING_CATEGORY_CODE);
        assert_eq!(json["code"]["coding"][0]["system"], fhir::DICOM_MODALITY);
        assert_eq!(json["code"]["coding"][0]["code"], "US");
        assert_eq!(json["code"]["text"], "Abdominal ultrasound");
        assert_eq!(json["identifier"][0]["value"], "IMG-9");
    }

    #[test]
    fn order_rejects_unknown_modality() {
        let order = ImagingOrderInput {
            patient_id: "p-1".into(),
            encounter_id: None,
            practitioner_id: None,
            modality: "XR".into(),
            description: "X-ray".into(),
            priority: None,
        };
        assert!(matches!(
            order.to_fhir("IMG-1"),
            Err(MappingError::InvalidField { field: "modality", .. })
        ));
    }

    #[test]
    fn webhook_shapes_study_and_optional_report() {
        let (study, report) = receive().to_fhir().unwrap();

        let study_json = serde_json::to_value(&study).unwrap();
        assert_eq!(study_json["resourceType"], "ImagingStudy");
        assert_eq!(study_json["status"], "available");
        assert_eq!(study_json["modality"][0]["code"], "CR");
        assert_eq!(study_json["numberOfSeries"], 1);
        assert_eq!(study_json["numberOfInstances"], 2);

        let report = report.expect("report_text should produce a report");
        let report_json = serde_json::to_value(&report).unwrap();
        assert_eq!(report_json["category"][0]["coding"][0]["code"], "RAD");
        assert_eq!(report_json["conclusion"], "No focal consolidation.");
    }

    #[test]
    fn webhook_without_read_produces_no_report() {
        let mut input = receive();
        input.report_text = None;
        let (_, report) = input.to_fhir().unwrap();
        assert!(report.is_none());
    }

    #[test]
    fn study_record_round_trip() {
        let (mut study, _) = receive().to_fhir().unwrap();
        study.id = Some("is-1".into());
        let record = ImagingStudyRecord::from_fhir(&study).unwrap();
        assert_eq!(record.modality, "CR");
        assert_eq!(record.accession.as_deref(), Some("IMG-7"));
        assert_eq!(record.instance_count, Some(2));
    }
}
