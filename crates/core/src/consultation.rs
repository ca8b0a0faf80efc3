//! Consultation mapping: one visit fans out into an Encounter plus its
//! linked Condition / Procedure / Observation resources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MappingError;
use crate::fhir::{
    self, CodeableConcept, Coding, EncounterParticipant, Extension, Quantity, Reference,
    SOAP_EXTENSION_BASE,
};

/// Encounter status progression used for the walk-in queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsultationStatus {
    Planned,
    Arrived,
    InProgress,
    Finished,
    Cancelled,
}

impl ConsultationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Arrived => "arrived",
            Self::InProgress => "in-progress",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(Self::Planned),
            "arrived" => Some(Self::Arrived),
            "in-progress" => Some(Self::InProgress),
            "finished" => Some(Self::Finished),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Queue progression: planned -> arrived -> in-progress -> finished,
    /// with cancellation allowed from any non-final state.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Planned, Self::Arrived)
                | (Self::Arrived, Self::InProgress)
                | (Self::InProgress, Self::Finished)
                | (Self::Planned, Self::Cancelled)
                | (Self::Arrived, Self::Cancelled)
                | (Self::InProgress, Self::Cancelled)
        )
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

/// SOAP note sections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoapNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subjective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
}

impl SoapNote {
    fn sections(&self) -> [(&'static str, Option<&String>); 4] {
        [
            ("subjective", self.subjective.as_ref()),
            ("objective", self.objective.as_ref()),
            ("assessment", self.assessment.as_ref()),
            ("plan", self.plan.as_ref()),
        ]
    }

    /// Serialize present sections as Encounter extensions.
    pub fn to_extensions(&self) -> Vec<Extension> {
        self.sections()
            .iter()
            .filter_map(|(name, value)| {
                value.map(|v| Extension::string(&format!("{}{}", SOAP_EXTENSION_BASE, name), v))
            })
            .collect()
    }

    /// Recover SOAP sections from Encounter extensions.
    pub fn from_extensions(extensions: &[Extension]) -> Option<Self> {
        let section = |name: &str| {
            fhir::extension_string(extensions, &format!("{}{}", SOAP_EXTENSION_BASE, name))
                .map(str::to_string)
        };
        let note = Self {
            subjective: section("subjective"),
            objective: section("objective"),
            assessment: section("assessment"),
            plan: section("plan"),
        };
        (note != Self::default()).then_some(note)
    }
}

/// Vital signs captured at triage, each mapped to a LOINC-coded Observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VitalKind {
    HeartRate,
    RespiratoryRate,
    Temperature,
    SystolicBloodPressure,
    DiastolicBloodPressure,
    OxygenSaturation,
    Weight,
    Height,
}

impl VitalKind {
    pub fn loinc(&self) -> &'static str {
        match self {
            Self::HeartRate => "8867-4",
            Self::RespiratoryRate => "9279-1",
            Self::Temperature => "8310-5",
            Self::SystolicBloodPressure => "8480-6",
            Self::DiastolicBloodPressure => "8462-4",
            Self::OxygenSaturation => "2708-6",
            Self::Weight => "29463-7",
            Self::Height => "8302-2",
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Self::HeartRate => "Heart rate",
            Self::RespiratoryRate => "Respiratory rate",
            Self::Temperature => "Body temperature",
            Self::SystolicBloodPressure => "Systolic blood pressure",
            Self::DiastolicBloodPressure => "Diastolic blood pressure",
            Self::OxygenSaturation => "Oxygen saturation",
            Self::Weight => "Body weight",
            Self::Height => "Body height",
        }
    }

    pub fn from_loinc(code: &str) -> Option<Self> {
        match code {
            "8867-4" => Some(Self::HeartRate),
            "9279-1" => Some(Self::RespiratoryRate),
            "8310-5" => Some(Self::Temperature),
            "8480-6" => Some(Self::SystolicBloodPressure),
            "8462-4" => Some(Self::DiastolicBloodPressure),
            "2708-6" => Some(Self::OxygenSaturation),
            "29463-7" => Some(Self::Weight),
            "8302-2" => Some(Self::Height),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VitalSign {
    pub kind: VitalKind,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Diagnosis {
    /// ICD-10 code, when coded at the desk
    #[serde(default)]
    pub code: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PerformedProcedure {
    #[serde(default)]
    pub code: Option<String>,
    pub description: String,
}

/// Payload accepted by POST /api/consultations
#[derive(Debug, Clone, Deserialize)]
pub struct ConsultationInput {
    pub patient_id: String,
    #[serde(default)]
    pub practitioner_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub soap: Option<SoapNote>,
    #[serde(default)]
    pub diagnoses: Vec<Diagnosis>,
    #[serde(default)]
    pub procedures: Vec<PerformedProcedure>,
    #[serde(default)]
    pub vitals: Vec<VitalSign>,
}

/// The FHIR fan-out for one consultation. Children carry no encounter
/// reference until `link_encounter` is called with the created id.
#[derive(Debug, Clone)]
pub struct ConsultationResources {
    pub encounter: fhir::Encounter,
    pub conditions: Vec<fhir::Condition>,
    pub procedures: Vec<fhir::Procedure>,
    pub observations: Vec<fhir::Observation>,
}

impl ConsultationResources {
    /// Point every child resource at the stored Encounter.
    pub fn link_encounter(&mut self, encounter_id: &str) {
        let reference = Reference::local("Encounter", encounter_id);
        for c in &mut self.conditions {
            c.encounter = Some(reference.clone());
        }
        for p in &mut self.procedures {
            p.encounter = Some(reference.clone());
        }
        for o in &mut self.observations {
            o.encounter = Some(reference.clone());
        }
    }
}

impl ConsultationInput {
    pub fn to_fhir(&self) -> Result<ConsultationResources, MappingError> {
        if self.patient_id.trim().is_empty() {
            return Err(MappingError::MissingField("patient_id"));
        }

        let subject = Reference::local("Patient", &self.patient_id);
        let started = self.started_at.unwrap_or_else(Utc::now);

        let mut encounter = fhir::Encounter::new();
        encounter.status = ConsultationStatus::Arrived.as_str().to_string();
        encounter.class = Some(Coding::new(fhir::V3_ACT_CODE, "AMB", "ambulatory"));
        encounter.subject = Some(subject.clone());
        encounter.period = Some(fhir::Period {
            start: Some(started),
            end: None,
        });
        if let Some(ref practitioner_id) = self.practitioner_id {
            encounter.participant = vec![EncounterParticipant {
                individual: Some(Reference::local("Practitioner", practitioner_id)),
            }];
        }
        if let Some(ref reason) = self.reason {
            encounter.reason_code = vec![CodeableConcept::text(reason)];
        }
        if let Some(ref soap) = self.soap {
            encounter.extension = soap.to_extensions();
        }

        let conditions = self
            .diagnoses
            .iter()
            .map(|d| {
                let mut condition = fhir::Condition::new();
                condition.clinical_status = Some(CodeableConcept::coded(
                    "http://terminology.hl7.org/CodeSystem/condition-clinical",
                    "active",
                    "Active",
                ));
                condition.code = Some(match d.code {
                    Some(ref code) => CodeableConcept::coded(fhir::ICD10, code, &d.description),
                    None => CodeableConcept::text(&d.description),
                });
                condition.subject = Some(subject.clone());
                condition.recorded_date = Some(started);
                condition
            })
            .collect();

        let procedures = self
            .procedures
            .iter()
            .map(|p| {
                let mut procedure = fhir::Procedure::new();
                procedure.status = "completed".into();
                procedure.code = Some(match p.code {
                    Some(ref code) => CodeableConcept::coded(fhir::SNOMED, code, &p.description),
                    None => CodeableConcept::text(&p.description),
                });
                procedure.subject = Some(subject.clone());
                procedure.performed_date_time = Some(started);
                procedure
            })
            .collect();

        let observations = self
            .vitals
            .iter()
            .map(|v| {
                let mut observation = fhir::Observation::new();
                observation.status = "final".into();
                observation.category = vec![CodeableConcept::coded(
                    fhir::OBSERVATION_CATEGORY,
                    "vital-signs",
                    "Vital Signs",
                )];
                observation.code =
                    CodeableConcept::coded(fhir::LOINC, v.kind.loinc(), v.kind.display());
                observation.subject = Some(subject.clone());
                observation.effective_date_time = Some(started);
                observation.value_quantity = Some(Quantity::new(v.value, &v.unit));
                observation
            })
            .collect();

        Ok(ConsultationResources {
            encounter,
            conditions,
            procedures,
            observations,
        })
    }
}

/// Application view of a consultation, recomposed from the Encounter and
/// the resources that reference it.
#[derive(Debug, Clone, Serialize)]
pub struct ConsultationRecord {
    pub id: String,
    pub status: ConsultationStatus,
    pub patient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub practitioner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soap: Option<SoapNote>,
    pub diagnoses: Vec<Diagnosis>,
    pub procedures: Vec<PerformedProcedure>,
    pub vitals: Vec<VitalSign>,
}

impl ConsultationRecord {
    pub fn from_fhir(
        encounter: &fhir::Encounter,
        conditions: &[fhir::Condition],
        procedures: &[fhir::Procedure],
        observations: &[fhir::Observation],
    ) -> Result<Self, MappingError> {
        let id = encounter
            .id
            .clone()
            .ok_or(MappingError::MissingField("id"))?;
        let status = ConsultationStatus::parse(&encounter.status).ok_or_else(|| {
            MappingError::invalid("status", format!("unrecognized status {:?}", encounter.status))
        })?;
        let patient_id = encounter
            .subject
            .as_ref()
            .and_then(|s| s.id())
            .ok_or(MappingError::MissingField("subject"))?
            .to_string();
        let practitioner_id = encounter
            .participant
            .first()
            .and_then(|p| p.individual.as_ref())
            .and_then(|r| r.id())
            .map(str::to_string);

        let diagnoses = conditions
            .iter()
            .filter_map(|c| c.code.as_ref())
            .map(|code| Diagnosis {
                code: code.code().map(str::to_string),
                description: code.display().unwrap_or_default().to_string(),
            })
            .collect();

        let performed = procedures
            .iter()
            .filter_map(|p| p.code.as_ref())
            .map(|code| PerformedProcedure {
                code: code.code().map(str::to_string),
                description: code.display().unwrap_or_default().to_string(),
            })
            .collect();

        let vitals = observations
            .iter()
            .filter_map(|o| {
                let kind = o.code.code().and_then(VitalKind::from_loinc)?;
                let quantity = o.value_quantity.as_ref()?;
                Some(VitalSign {
                    kind,
                    value: quantity.value?,
                    unit: quantity.unit.clone().unwrap_or_default(),
                })
            })
            .collect();

        Ok(Self {
            id,
            status,
            patient_id,
            practitioner_id,
            reason: encounter
                .reason_code
                .first()
                .and_then(|r| r.display())
                .map(str::to_string),
            started_at: encounter.period.as_ref().and_then(|p| p.start),
            ended_at: encounter.period.as_ref().and_then(|p| p.end),
            soap: SoapNote::from_extensions(&encounter.extension),
            diagnoses,
            procedures: performed,
            vitals,
        })
    }
}

/// Summary row for consultation listings and the waiting-room queue.
#[derive(Debug, Clone, Serialize)]
pub struct ConsultationSummary {
    pub id: String,
    pub patient_id: String,
    pub status: ConsultationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ConsultationSummary {
    pub fn from_fhir(encounter: &fhir::Encounter) -> Option<Self> {
        let status = ConsultationStatus::parse(&encounter.status)?;
        Some(Self {
            id: encounter.id.clone()?,
            patient_id: encounter
                .subject
                .as_ref()
                .and_then(|s| s.id())?
                .to_string(),
            status,
            started_at: encounter.period.as_ref().and_then(|p| p.start),
            reason: encounter
                .reason_code
                .first()
                .and_then(|r| r.display())
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn input() -> ConsultationInput {
        ConsultationInput {
            patient_id: "p-1".into(),
            practitioner_id: Some("dr-9".into()),
            reason: Some("fever and headache".into()),
            started_at: Some(Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()),
            soap: Some(SoapNote {
                subjective: Some("3 days of fever".into()),
                objective: Some("Temp 38.4C".into()),
                assessment: Some("Likely malaria".into()),
                plan: Some("RDT, artemether".into()),
            }),
            diagnoses: vec![Diagnosis {
                code: Some("B54".into()),
                description: "Unspecified malaria".into(),
            }],
            procedures: vec![PerformedProcedure {
                code: None,
                description: "Wound dressing".into(),
            }],
            vitals: vec![
                VitalSign {
                    kind: VitalKind::Temperature,
                    value: 38.4,
                    unit: "C".into(),
                },
                VitalSign {
                    kind: VitalKind::HeartRate,
                    value: 96.0,
                    unit: "/min".into(),
                },
            ],
        }
    }

    #[test]
    fn fans_out_into_linked_resources() {
        let mut resources = input().to_fhir().unwrap();

        let enc = serde_json::to_value(&resources.encounter).unwrap();
        assert_eq!(enc["resourceType"], "Encounter");
        assert_eq!(enc["status"], "arrived");
        assert_eq!(enc["class"]["code"], "AMB");
        assert_eq!(enc["subject"]["reference"], "Patient/p-1");
        assert_eq!(
            enc["participant"][0]["individual"]["reference"],
            "Practitioner/dr-9"
        );
        assert_eq!(enc["period"]["start"], "2026-03-02T09:30:00Z");

        assert_eq!(resources.conditions.len(), 1);
        assert_eq!(resources.procedures.len(), 1);
        assert_eq!(resources.observations.len(), 2);

        resources.link_encounter("e-77");
        let cond = serde_json::to_value(&resources.conditions[0]).unwrap();
        assert_eq!(cond["encounter"]["reference"], "Encounter/e-77");
        assert_eq!(cond["code"]["coding"][0]["system"], fhir::ICD10);
        assert_eq!(cond["code"]["coding"][0]["code"], "B54");

        let obs = serde_json::to_value(&resources.observations[0]).unwrap();
        assert_eq!(obs["code"]["coding"][0]["code"], "8310-5");
        assert_eq!(obs["valueQuantity"]["value"], 38.4);
        assert_eq!(obs["category"][0]["coding"][0]["code"], "vital-signs");
    }

    #[test]
    fn soap_note_survives_extension_round_trip() {
        let resources = input().to_fhir().unwrap();
        let note = SoapNote::from_extensions(&resources.encounter.extension).unwrap();
        assert_eq!(note.assessment.as_deref(), Some("Likely malaria"));
        assert_eq!(note.plan.as_deref(), Some("RDT, artemether"));
    }

    #[test]
    fn rejects_missing_patient() {
        let mut bad = input();
        bad.patient_id = String::new();
        assert!(matches!(
            bad.to_fhir(),
            Err(MappingError::MissingField("patient_id"))
        ));
    }

    #[test]
    fn recomposes_record_from_parts() {
        let mut resources = input().to_fhir().unwrap();
        resources.encounter.id = Some("e-1".into());
        resources.link_encounter("e-1");

        let record = ConsultationRecord::from_fhir(
            &resources.encounter,
            &resources.conditions,
            &resources.procedures,
            &resources.observations,
        )
        .unwrap();

        assert_eq!(record.id, "e-1");
        assert_eq!(record.status, ConsultationStatus::Arrived);
        assert_eq!(record.patient_id, "p-1");
        assert_eq!(record.practitioner_id.as_deref(), Some("dr-9"));
        assert_eq!(record.diagnoses[0].code.as_deref(), Some("B54"));
        assert_eq!(record.vitals.len(), 2);
        assert_eq!(record.vitals[1].kind, VitalKind::HeartRate);
    }

    #[test]
    fn queue_transitions_are_ordered() {
        use ConsultationStatus::*;
        assert!(Planned.can_transition_to(Arrived));
        assert!(Arrived.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Finished));
        assert!(Arrived.can_transition_to(Cancelled));

        assert!(!Arrived.can_transition_to(Finished));
        assert!(!Finished.can_transition_to(InProgress));
        assert!(!Cancelled.can_transition_to(Arrived));
        assert!(Finished.is_final());
    }

    #[test]
    fn non_vital_observations_are_skipped_in_record() {
        let resources = input().to_fhir().unwrap();
        let mut encounter = resources.encounter.clone();
        encounter.id = Some("e-2".into());

        let mut note_obs = fhir::Observation::new();
        note_obs.status = "final".into();
        note_obs.code = CodeableConcept::text("free text note");

        let record =
            ConsultationRecord::from_fhir(&encounter, &[], &[], &[note_obs]).unwrap();
        assert!(record.vitals.is_empty());
    }
}
