//! Referral mapping: outbound specialist referral <-> FHIR ServiceRequest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MappingError;
use crate::fhir::{self, Annotation, CodeableConcept, Reference};

/// SNOMED code marking a ServiceRequest as a patient referral.
const REFERRAL_CATEGORY_CODE: &str = "3457005";

/// Payload accepted by POST /api/referrals
#[derive(Debug, Clone, Deserialize)]
pub struct ReferralInput {
    pub patient_id: String,
    #[serde(default)]
    pub encounter_id: Option<String>,
    #[serde(default)]
    pub practitioner_id: Option<String>,
    /// Receiving specialty or facility, free text
    pub referred_to: String,
    pub reason: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReferralInput {
    pub fn to_fhir(&self) -> Result<fhir::ServiceRequest, MappingError> {
        if self.patient_id.trim().is_empty() {
            return Err(MappingError::MissingField("patient_id"));
        }
        if self.referred_to.trim().is_empty() {
            return Err(MappingError::MissingField("referred_to"));
        }
        if self.reason.trim().is_empty() {
            return Err(MappingError::MissingField("reason"));
        }
        if let Some(ref p) = self.priority {
            if !["routine", "urgent", "asap", "stat"].contains(&p.as_str()) {
                return Err(MappingError::invalid(
                    "priority",
                    "must be routine, urgent, asap or stat",
                ));
            }
        }

        let mut request = fhir::ServiceRequest::new();
        request.status = "active".into();
        request.intent = "order".into();
        request.category = vec![CodeableConcept::coded(
            fhir::SNOMED,
            REFERRAL_CATEGORY_CODE,
            "Patient referral",
        )];
        request.priority = self.priority.clone();
        request.code = Some(CodeableConcept::text(&self.referred_to));
        request.subject = Some(Reference::local("Patient", &self.patient_id));
        request.encounter = self
            .encounter_id
            .as_ref()
            .map(|id| Reference::local("Encounter", id));
        request.requester = self
            .practitioner_id
            .as_ref()
            .map(|id| Reference::local("Practitioner", id));
        request.reason_code = vec![CodeableConcept::text(&self.reason)];
        request.authored_on = Some(Utc::now());
        if let Some(ref notes) = self.notes {
            request.note = vec![Annotation::new(notes)];
        }
        Ok(request)
    }
}

/// Application view of a stored referral
#[derive(Debug, Clone, Serialize)]
pub struct ReferralRecord {
    pub id: String,
    pub status: String,
    pub patient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub practitioner_id: Option<String>,
    pub referred_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authored_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ReferralRecord {
    pub fn from_fhir(request: &fhir::ServiceRequest) -> Result<Self, MappingError> {
        let id = request.id.clone().ok_or(MappingError::MissingField("id"))?;
        let patient_id = request
            .subject
            .as_ref()
            .and_then(|s| s.id())
            .ok_or(MappingError::MissingField("subject"))?
            .to_string();

        Ok(Self {
            id,
            status: request.status.clone(),
            patient_id,
            practitioner_id: request
                .requester
                .as_ref()
                .and_then(|r| r.id())
                .map(str::to_string),
            referred_to: request
                .code
                .as_ref()
                .and_then(|c| c.display())
                .unwrap_or_default()
                .to_string(),
            reason: request
                .reason_code
                .first()
                .and_then(|r| r.display())
                .map(str::to_string),
            priority: request.priority.clone(),
            authored_on: request.authored_on,
            notes: request.note.first().map(|n| n.text.clone()),
        })
    }

    /// True when the ServiceRequest carries the referral category.
    pub fn is_referral(request: &fhir::ServiceRequest) -> bool {
        request
            .category
            .iter()
            .any(|c| c.code() == Some(REFERRAL_CATEGORY_CODE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ReferralInput {
        ReferralInput {
            patient_id: "p-1".into(),
            encounter_id: Some("e-4".into()),
            practitioner_id: Some("dr-2".into()),
            referred_to: "Cardiology, General Hospital".into(),
            reason: "suspected arrhythmia".into(),
            priority: Some("urgent".into()),
            notes: Some("ECG attached".into()),
        }
    }

    #[test]
    fn shapes_referral_into_service_request() {
        let json = serde_json::to_value(input().to_fhir().unwrap()).unwrap();
        assert_eq!(json["resourceType"], "ServiceRequest");
        assert_eq!(json["intent"], "order");
        assert_eq!(json["category"][0]["coding"][0]["code"], REFERRAL_CATEGORY_CODE);
        assert_eq!(json["priority"], "urgent");
        assert_eq!(json["subject"]["reference"], "Patient/p-1");
        assert_eq!(json["encounter"]["reference"], "Encounter/e-4");
        assert_eq!(json["requester"]["reference"], "Practitioner/dr-2");
        assert_eq!(json["note"][0]["text"], "ECG attached");
    }

    #[test]
    fn rejects_bad_priority() {
        let mut bad = input();
        bad.priority = Some("whenever".into());
        assert!(bad.to_fhir().is_err());
    }

    #[test]
    fn record_round_trip() {
        let mut request = input().to_fhir().unwrap();
        request.id = Some("r-9".into());
        assert!(ReferralRecord::is_referral(&request));

        let record = ReferralRecord::from_fhir(&request).unwrap();
        assert_eq!(record.referred_to, "Cardiology, General Hospital");
        assert_eq!(record.reason.as_deref(), Some("suspected arrhythmia"));
        assert_eq!(record.notes.as_deref(), Some("ECG attached"));
    }
}
