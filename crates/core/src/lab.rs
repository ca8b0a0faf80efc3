//! Lab order and result mapping
//!
//! Orders go out as laboratory ServiceRequests; results arrive on the
//! POCT webhook and become a DiagnosticReport with member Observations,
//! linked back to the order by accession identifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MappingError;
use crate::fhir::{self, Annotation, CodeableConcept, Identifier, Quantity, Reference};

/// Identifier system for lab accession numbers.
pub const ACCESSION_SYSTEM: &str = "https://clinic-gateway.dev/fhir/identifiers/accession";

/// SNOMED code for laboratory procedure category.
const LAB_CATEGORY_CODE: &str = "108252007";

/// One test on a lab order slip.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LabTest {
    /// LOINC code when the ordering screen has one
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
}

impl LabTest {
    fn to_concept(&self) -> CodeableConcept {
        match self.code {
            Some(ref code) => CodeableConcept::coded(fhir::LOINC, code, &self.name),
            None => CodeableConcept::text(&self.name),
        }
    }
}

/// Payload accepted by POST /api/labs/orders
#[derive(Debug, Clone, Deserialize)]
pub struct LabOrderInput {
    pub patient_id: String,
    #[serde(default)]
    pub encounter_id: Option<String>,
    #[serde(default)]
    pub practitioner_id: Option<String>,
    pub tests: Vec<LabTest>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl LabOrderInput {
    /// Shape the order into one ServiceRequest per test, all sharing the
    /// given accession so the result webhook can find them.
    pub fn to_fhir(&self, accession: &str) -> Result<Vec<fhir::ServiceRequest>, MappingError> {
        if self.patient_id.trim().is_empty() {
            return Err(MappingError::MissingField("patient_id"));
        }
        if self.tests.is_empty() {
            return Err(MappingError::MissingField("tests"));
        }

        let subject = Reference::local("Patient", &self.patient_id);
        let authored = Utc::now();

        Ok(self
            .tests
            .iter()
            .map(|test| {
                let mut request = fhir::ServiceRequest::new();
                request.identifier = vec![Identifier::new(ACCESSION_SYSTEM, accession)];
                request.status = "active".into();
                request.intent = "order".into();
                request.category = vec![CodeableConcept::coded(
                    fhir::SNOMED,
                    LAB_CATEGORY_CODE,
                    "Laboratory procedure",
                )];
                request.priority = self.priority.clone();
                request.code = Some(test.to_concept());
                request.subject = Some(subject.clone());
                request.encounter = self
                    .encounter_id
                    .as_ref()
                    .map(|id| Reference::local("Encounter", id));
                request.requester = self
                    .practitioner_id
                    .as_ref()
                    .map(|id| Reference::local("Practitioner", id));
                request.authored_on = Some(authored);
                if let Some(ref note) = self.note {
                    request.note = vec![Annotation::new(note)];
                }
                request
            })
            .collect())
    }
}

/// One analyte value in a POCT result message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LabResultEntry {
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub reference_low: Option<f64>,
    #[serde(default)]
    pub reference_high: Option<f64>,
    /// Abnormal flag: H, L, N or A
    #[serde(default)]
    pub flag: Option<String>,
}

/// Payload accepted by POST /api/labs/receive (POCT webhook)
#[derive(Debug, Clone, Deserialize)]
pub struct LabReceiveInput {
    #[serde(default)]
    pub accession: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub performed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub panel: Option<LabTest>,
    pub results: Vec<LabResultEntry>,
    #[serde(default)]
    pub conclusion: Option<String>,
}

fn interpretation_concept(flag: &str) -> Option<CodeableConcept> {
    let display = match flag {
        "H" => "High",
        "L" => "Low",
        "N" => "Normal",
        "A" => "Abnormal",
        _ => return None,
    };
    Some(CodeableConcept::coded(fhir::V3_INTERPRETATION, flag, display))
}

impl LabReceiveInput {
    /// Shape the webhook payload into a report and its member observations.
    /// The report's `result` references stay empty until the observations
    /// have been stored and their ids are known.
    pub fn to_fhir(&self) -> Result<(fhir::DiagnosticReport, Vec<fhir::Observation>), MappingError> {
        if self.results.is_empty() {
            return Err(MappingError::MissingField("results"));
        }
        for (i, entry) in self.results.iter().enumerate() {
            if entry.value.is_none() && entry.text.is_none() {
                return Err(MappingError::invalid(
                    "results",
                    format!("entry {} has neither value nor text", i),
                ));
            }
        }

        let subject = self
            .patient_id
            .as_ref()
            .map(|id| Reference::local("Patient", id));
        let effective = self.performed_at.unwrap_or_else(Utc::now);

        let observations = self
            .results
            .iter()
            .map(|entry| {
                let mut observation = fhir::Observation::new();
                observation.status = "final".into();
                observation.category = vec![CodeableConcept::coded(
                    fhir::OBSERVATION_CATEGORY,
                    "laboratory",
                    "Laboratory",
                )];
                observation.code = match entry.code {
                    Some(ref code) => CodeableConcept::coded(fhir::LOINC, code, &entry.name),
                    None => CodeableConcept::text(&entry.name),
                };
                observation.subject = subject.clone();
                observation.effective_date_time = Some(effective);
                if let Some(value) = entry.value {
                    observation.value_quantity = Some(Quantity {
                        value: Some(value),
                        unit: entry.unit.clone(),
                    });
                } else {
                    observation.value_string = entry.text.clone();
                }
                if let Some(concept) = entry.flag.as_deref().and_then(interpretation_concept) {
                    observation.interpretation = vec![concept];
                }
                if entry.reference_low.is_some() || entry.reference_high.is_some() {
                    observation.reference_range = vec![fhir::ReferenceRange {
                        low: entry
                            .reference_low
                            .map(|v| Quantity {
                                value: Some(v),
                                unit: entry.unit.clone(),
                            }),
                        high: entry
                            .reference_high
                            .map(|v| Quantity {
                                value: Some(v),
                                unit: entry.unit.clone(),
                            }),
                        text: None,
                    }];
                }
                observation
            })
            .collect();

        let mut report = fhir::DiagnosticReport::new();
        if let Some(ref accession) = self.accession {
            report.identifier = vec![Identifier::new(ACCESSION_SYSTEM, accession)];
        }
        report.status = "final".into();
        report.category = vec![CodeableConcept::coded(
            "http://terminology.hl7.org/CodeSystem/v2-0074",
            "LAB",
            "Laboratory",
        )];
        report.code = self
            .panel
            .as_ref()
            .map(|p| p.to_concept())
            .unwrap_or_else(|| CodeableConcept::text("Laboratory report"));
        report.subject = subject;
        report.effective_date_time = Some(effective);
        report.issued = Some(Utc::now());
        report.conclusion = self.conclusion.clone();

        Ok((report, observations))
    }
}

/// Report-level view for GET /api/labs/results
#[derive(Debug, Clone, Serialize)]
pub struct LabReportRecord {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession: Option<String>,
    pub panel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    /// Ids of the member Observations
    pub observation_ids: Vec<String>,
}

impl LabReportRecord {
    pub fn from_fhir(report: &fhir::DiagnosticReport) -> Result<Self, MappingError> {
        let id = report.id.clone().ok_or(MappingError::MissingField("id"))?;
        Ok(Self {
            id,
            status: report.status.clone(),
            accession: report
                .identifier
                .iter()
                .find(|i| i.system.as_deref() == Some(ACCESSION_SYSTEM))
                .and_then(|i| i.value.clone()),
            panel: report.code.display().unwrap_or_default().to_string(),
            patient_id: report
                .subject
                .as_ref()
                .and_then(|s| s.id())
                .map(str::to_string),
            performed_at: report.effective_date_time,
            conclusion: report.conclusion.clone(),
            observation_ids: report
                .result
                .iter()
                .filter_map(|r| r.id())
                .map(str::to_string)
                .collect(),
        })
    }
}

/// One analyte value recovered from a stored Observation.
#[derive(Debug, Clone, Serialize)]
pub struct LabValue {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_high: Option<f64>,
}

impl LabValue {
    pub fn from_fhir(observation: &fhir::Observation) -> Self {
        let range = observation.reference_range.first();
        Self {
            name: observation.code.display().unwrap_or_default().to_string(),
            code: observation.code.code().map(str::to_string),
            value: observation.value_quantity.as_ref().and_then(|q| q.value),
            text: observation.value_string.clone(),
            unit: observation
                .value_quantity
                .as_ref()
                .and_then(|q| q.unit.clone()),
            flag: observation
                .interpretation
                .first()
                .and_then(|i| i.code())
                .map(str::to_string),
            reference_low: range
                .and_then(|r| r.low.as_ref())
                .and_then(|q| q.value),
            reference_high: range
                .and_then(|r| r.high.as_ref())
                .and_then(|q| q.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> LabOrderInput {
        LabOrderInput {
            patient_id: "p-1".into(),
            encounter_id: Some("e-1".into()),
            practitioner_id: Some("dr-2".into()),
            tests: vec![
                LabTest {
                    code: Some("718-7".into()),
                    name: "Hemoglobin".into(),
                },
                LabTest {
                    code: None,
                    name: "Malaria RDT".into(),
                },
            ],
            priority: Some("routine".into()),
            note: None,
        }
    }

    fn receive() -> LabReceiveInput {
        LabReceiveInput {
            accession: Some("ACC-1001".into()),
            patient_id: Some("p-1".into()),
            performed_at: None,
            panel: Some(LabTest {
                code: Some("58410-2".into()),
                name: "CBC panel".into(),
            }),
            results: vec![
                LabResultEntry {
                    code: Some("718-7".into()),
                    name: "Hemoglobin".into(),
                    value: Some(9.1),
                    text: None,
                    unit: Some("g/dL".into()),
                    reference_low: Some(12.0),
                    reference_high: Some(16.0),
                    flag: Some("L".into()),
                },
                LabResultEntry {
                    code: None,
                    name: "Malaria RDT".into(),
                    value: None,
                    text: Some("Positive".into()),
                    unit: None,
                    reference_low: None,
                    reference_high: None,
                    flag: Some("A".into()),
                },
            ],
            conclusion: Some("Anemia, malaria positive".into()),
        }
    }

    #[test]
    fn order_fans_out_per_test_under_one_accession() {
        let requests = order().to_fhir("ACC-1001").unwrap();
        assert_eq!(requests.len(), 2);

        for request in &requests {
            let json = serde_json::to_value(request).unwrap();
            assert_eq!(json["identifier"][0]["system"], ACCESSION_SYSTEM);
            assert_eq!(json["identifier"][0]["value"], "ACC-1001");
            assert_eq!(json["category"][0]["coding"][0]["code"], LAB_CATEGORY_CODE);
            assert_eq!(json["subject"]["reference"], "Patient/p-1");
        }
        let first = serde_json::to_value(&requests[0]).unwrap();
        assert_eq!(first["code"]["coding"][0]["system"], fhir::LOINC);
        assert_eq!(first["code"]["coding"][0]["code"], "718-7");
    }

    #[test]
    fn order_requires_tests() {
        let mut bad = order();
        bad.tests.clear();
        assert!(matches!(
            bad.to_fhir("ACC-1"),
            Err(MappingError::MissingField("tests"))
        ));
    }

    #[test]
    fn webhook_shapes_report_and_observations() {
        let (report, observations) = receive().to_fhir().unwrap();

        let report_json = serde_json::to_value(&report).unwrap();
        assert_eq!(report_json["resourceType"], "DiagnosticReport");
        assert_eq!(report_json["status"], "final");
        assert_eq!(report_json["identifier"][0]["value"], "ACC-1001");
        assert_eq!(report_json["code"]["coding"][0]["code"], "58410-2");
        assert_eq!(report_json["conclusion"], "Anemia, malaria positive");
        assert!(report_json.get("result").is_none());

        assert_eq!(observations.len(), 2);
        let hb = serde_json::to_value(&observations[0]).unwrap();
        assert_eq!(hb["valueQuantity"]["value"], 9.1);
        assert_eq!(hb["valueQuantity"]["unit"], "g/dL");
        assert_eq!(hb["interpretation"][0]["coding"][0]["code"], "L");
        assert_eq!(hb["referenceRange"][0]["low"]["value"], 12.0);
        assert_eq!(hb["referenceRange"][0]["high"]["value"], 16.0);

        let rdt = serde_json::to_value(&observations[1]).unwrap();
        assert_eq!(rdt["valueString"], "Positive");
        assert!(rdt.get("valueQuantity").is_none());
    }

    #[test]
    fn webhook_rejects_valueless_entry() {
        let mut bad = receive();
        bad.results[0].value = None;
        assert!(matches!(
            bad.to_fhir(),
            Err(MappingError::InvalidField { field: "results", .. })
        ));
    }

    #[test]
    fn report_record_and_values_round_trip() {
        let (mut report, observations) = receive().to_fhir().unwrap();
        report.id = Some("dr-1".into());
        report.result = vec![
            Reference::local("Observation", "o-1"),
            Reference::local("Observation", "o-2"),
        ];

        let record = LabReportRecord::from_fhir(&report).unwrap();
        assert_eq!(record.accession.as_deref(), Some("ACC-1001"));
        assert_eq!(record.panel, "CBC panel");
        assert_eq!(record.observation_ids, vec!["o-1", "o-2"]);

        let value = LabValue::from_fhir(&observations[0]);
        assert_eq!(value.name, "Hemoglobin");
        assert_eq!(value.value, Some(9.1));
        assert_eq!(value.flag.as_deref(), Some("L"));
        assert_eq!(value.reference_high, Some(16.0));
    }
}
