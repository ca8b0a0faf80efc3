//! Appointment booking mapping: application booking <-> FHIR Appointment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MappingError;
use crate::fhir::{self, AppointmentParticipant, Reference};

/// FHIR appointment statuses the clinic front desk works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Proposed,
    Booked,
    Arrived,
    Fulfilled,
    Cancelled,
    Noshow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Booked => "booked",
            Self::Arrived => "arrived",
            Self::Fulfilled => "fulfilled",
            Self::Cancelled => "cancelled",
            Self::Noshow => "noshow",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "proposed" => Some(Self::Proposed),
            "booked" => Some(Self::Booked),
            "arrived" => Some(Self::Arrived),
            "fulfilled" => Some(Self::Fulfilled),
            "cancelled" => Some(Self::Cancelled),
            "noshow" => Some(Self::Noshow),
            _ => None,
        }
    }
}

/// Payload accepted by POST /api/appointments
#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentInput {
    pub patient_id: String,
    #[serde(default)]
    pub practitioner_id: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AppointmentInput {
    pub fn to_fhir(&self) -> Result<fhir::Appointment, MappingError> {
        if self.patient_id.trim().is_empty() {
            return Err(MappingError::MissingField("patient_id"));
        }
        if self.end <= self.start {
            return Err(MappingError::invalid("end", "must be after start"));
        }

        let mut appointment = fhir::Appointment::new();
        appointment.status = AppointmentStatus::Booked.as_str().to_string();
        appointment.description = self.reason.clone();
        appointment.start = Some(self.start);
        appointment.end = Some(self.end);
        appointment.participant = vec![AppointmentParticipant {
            actor: Some(Reference::local("Patient", &self.patient_id)),
            status: "accepted".into(),
        }];
        if let Some(ref practitioner_id) = self.practitioner_id {
            appointment.participant.push(AppointmentParticipant {
                actor: Some(Reference::local("Practitioner", practitioner_id)),
                status: "accepted".into(),
            });
        }
        Ok(appointment)
    }
}

/// Application view of a stored appointment
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentRecord {
    pub id: String,
    pub status: AppointmentStatus,
    pub patient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub practitioner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AppointmentRecord {
    pub fn from_fhir(appointment: &fhir::Appointment) -> Result<Self, MappingError> {
        let id = appointment
            .id
            .clone()
            .ok_or(MappingError::MissingField("id"))?;
        let status = AppointmentStatus::parse(&appointment.status).ok_or_else(|| {
            MappingError::invalid(
                "status",
                format!("unrecognized status {:?}", appointment.status),
            )
        })?;

        let actor_id = |resource_type: &str| {
            appointment
                .participant
                .iter()
                .filter_map(|p| p.actor.as_ref())
                .filter_map(|a| a.reference.as_deref())
                .find(|r| r.starts_with(resource_type))
                .and_then(|r| r.rsplit('/').next())
                .map(str::to_string)
        };

        let patient_id = actor_id("Patient/").ok_or(MappingError::MissingField("participant"))?;

        Ok(Self {
            id,
            status,
            patient_id,
            practitioner_id: actor_id("Practitioner/"),
            start: appointment.start,
            end: appointment.end,
            reason: appointment.description.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn input() -> AppointmentInput {
        AppointmentInput {
            patient_id: "p-1".into(),
            practitioner_id: Some("dr-2".into()),
            start: Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 3, 5, 10, 30, 0).unwrap(),
            reason: Some("follow-up".into()),
        }
    }

    #[test]
    fn shapes_booking_into_fhir_appointment() {
        let json = serde_json::to_value(input().to_fhir().unwrap()).unwrap();
        assert_eq!(json["resourceType"], "Appointment");
        assert_eq!(json["status"], "booked");
        assert_eq!(json["participant"][0]["actor"]["reference"], "Patient/p-1");
        assert_eq!(
            json["participant"][1]["actor"]["reference"],
            "Practitioner/dr-2"
        );
        assert_eq!(json["description"], "follow-up");
    }

    #[test]
    fn rejects_inverted_slot() {
        let mut bad = input();
        bad.end = bad.start;
        assert!(matches!(
            bad.to_fhir(),
            Err(MappingError::InvalidField { field: "end", .. })
        ));
    }

    #[test]
    fn record_finds_participants_regardless_of_order() {
        let mut appointment = input().to_fhir().unwrap();
        appointment.id = Some("a-3".into());
        appointment.participant.reverse();

        let record = AppointmentRecord::from_fhir(&appointment).unwrap();
        assert_eq!(record.patient_id, "p-1");
        assert_eq!(record.practitioner_id.as_deref(), Some("dr-2"));
        assert_eq!(record.status, AppointmentStatus::Booked);
    }
}
