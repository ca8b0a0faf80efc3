//! Patient registration mapping: application demographics <-> FHIR Patient

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::MappingError;
use crate::fhir::{self, Address, ContactPoint, HumanName, Identifier};

/// Identifier system for clinic medical record numbers.
pub const MRN_SYSTEM: &str = "https://clinic-gateway.dev/fhir/identifiers/mrn";

const GENDERS: [&str; 4] = ["male", "female", "other", "unknown"];

/// Registration payload accepted by POST /api/patients
#[derive(Debug, Clone, Deserialize)]
pub struct PatientInput {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<AddressInput>,
    #[serde(default)]
    pub mrn: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AddressInput {
    #[serde(default)]
    pub line: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Application view of a stored patient
#[derive(Debug, Clone, Serialize)]
pub struct PatientRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mrn: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<AddressInput>,
}

impl PatientInput {
    /// Shape the registration payload into a FHIR Patient.
    pub fn to_fhir(&self) -> Result<fhir::Patient, MappingError> {
        if self.first_name.trim().is_empty() {
            return Err(MappingError::MissingField("first_name"));
        }
        if self.last_name.trim().is_empty() {
            return Err(MappingError::MissingField("last_name"));
        }
        if let Some(ref g) = self.gender {
            if !GENDERS.contains(&g.as_str()) {
                return Err(MappingError::invalid(
                    "gender",
                    format!("must be one of {:?}", GENDERS),
                ));
            }
        }

        let mut patient = fhir::Patient::new();
        patient.active = Some(true);
        patient.name = vec![HumanName {
            name_use: Some("official".into()),
            text: Some(format!("{} {}", self.first_name.trim(), self.last_name.trim())),
            family: Some(self.last_name.trim().to_string()),
            given: vec![self.first_name.trim().to_string()],
        }];
        patient.gender = self.gender.clone();
        patient.birth_date = self.birth_date;

        if let Some(ref phone) = self.phone {
            patient.telecom.push(ContactPoint::phone(phone));
        }
        if let Some(ref email) = self.email {
            patient.telecom.push(ContactPoint::email(email));
        }
        if let Some(ref mrn) = self.mrn {
            patient.identifier.push(Identifier::new(MRN_SYSTEM, mrn));
        }
        if let Some(ref addr) = self.address {
            patient.address.push(Address {
                line: addr.line.iter().cloned().collect(),
                city: addr.city.clone(),
                state: addr.state.clone(),
                postal_code: addr.postal_code.clone(),
                country: addr.country.clone(),
            });
        }

        Ok(patient)
    }
}

impl PatientRecord {
    /// Recover the application view from a stored FHIR Patient.
    pub fn from_fhir(patient: &fhir::Patient) -> Result<Self, MappingError> {
        let id = patient
            .id
            .clone()
            .ok_or(MappingError::MissingField("id"))?;

        let name = patient.name.first();
        let first_name = name
            .and_then(|n| n.given.first().cloned())
            .unwrap_or_default();
        let last_name = name.and_then(|n| n.family.clone()).unwrap_or_default();

        let telecom_value = |system: &str| {
            patient
                .telecom
                .iter()
                .find(|t| t.system.as_deref() == Some(system))
                .and_then(|t| t.value.clone())
        };

        let mrn = patient
            .identifier
            .iter()
            .find(|i| i.system.as_deref() == Some(MRN_SYSTEM))
            .and_then(|i| i.value.clone());

        let address = patient.address.first().map(|a| AddressInput {
            line: a.line.first().cloned(),
            city: a.city.clone(),
            state: a.state.clone(),
            postal_code: a.postal_code.clone(),
            country: a.country.clone(),
        });

        Ok(Self {
            id,
            mrn,
            first_name,
            last_name,
            gender: patient.gender.clone(),
            birth_date: patient.birth_date,
            phone: telecom_value("phone"),
            email: telecom_value("email"),
            address,
        })
    }
}

/// Demographics fields accepted by PATCH /api/patients/{id}, translated
/// into JSON Patch operations against the stored resource.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientUpdate {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
}

impl PatientUpdate {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none()
            && self.email.is_none()
            && self.gender.is_none()
            && self.birth_date.is_none()
    }

    /// Apply the update to the current resource, returning the new shape.
    ///
    /// Medplum supports JSON Patch, but replacing fields on the fetched
    /// resource and PUTting it back keeps telecom merging in one place.
    pub fn apply(&self, current: &fhir::Patient) -> Result<fhir::Patient, MappingError> {
        if let Some(ref g) = self.gender {
            if !GENDERS.contains(&g.as_str()) {
                return Err(MappingError::invalid(
                    "gender",
                    format!("must be one of {:?}", GENDERS),
                ));
            }
        }

        let mut updated = current.clone();
        if let Some(ref g) = self.gender {
            updated.gender = Some(g.clone());
        }
        if let Some(d) = self.birth_date {
            updated.birth_date = Some(d);
        }
        if let Some(ref phone) = self.phone {
            updated.telecom.retain(|t| t.system.as_deref() != Some("phone"));
            updated.telecom.push(ContactPoint::phone(phone));
        }
        if let Some(ref email) = self.email {
            updated.telecom.retain(|t| t.system.as_deref() != Some("email"));
            updated.telecom.push(ContactPoint::email(email));
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> PatientInput {
        PatientInput {
            first_name: "Ada".into(),
            last_name: "Okafor".into(),
            gender: Some("female".into()),
            birth_date: NaiveDate::from_ymd_opt(1990, 4, 12),
            phone: Some("+2348012345678".into()),
            email: Some("ada@example.org".into()),
            address: Some(AddressInput {
                line: Some("12 Marina Rd".into()),
                city: Some("Lagos".into()),
                ..Default::default()
            }),
            mrn: Some("MRN-0042".into()),
        }
    }

    #[test]
    fn shapes_registration_into_fhir_patient() {
        let patient = input().to_fhir().unwrap();
        let json = serde_json::to_value(&patient).unwrap();

        assert_eq!(json["resourceType"], "Patient");
        assert_eq!(json["name"][0]["family"], "Okafor");
        assert_eq!(json["name"][0]["given"][0], "Ada");
        assert_eq!(json["gender"], "female");
        assert_eq!(json["birthDate"], "1990-04-12");
        assert_eq!(json["telecom"][0]["system"], "phone");
        assert_eq!(json["telecom"][1]["value"], "ada@example.org");
        assert_eq!(json["identifier"][0]["system"], MRN_SYSTEM);
        assert_eq!(json["identifier"][0]["value"], "MRN-0042");
        assert_eq!(json["address"][0]["city"], "Lagos");
    }

    #[test]
    fn rejects_blank_name() {
        let mut bad = input();
        bad.first_name = "  ".into();
        assert!(matches!(
            bad.to_fhir(),
            Err(MappingError::MissingField("first_name"))
        ));
    }

    #[test]
    fn rejects_unknown_gender() {
        let mut bad = input();
        bad.gender = Some("F".into());
        assert!(matches!(
            bad.to_fhir(),
            Err(MappingError::InvalidField { field: "gender", .. })
        ));
    }

    #[test]
    fn round_trips_through_record_view() {
        let mut patient = input().to_fhir().unwrap();
        patient.id = Some("p-1".into());

        let record = PatientRecord::from_fhir(&patient).unwrap();
        assert_eq!(record.id, "p-1");
        assert_eq!(record.first_name, "Ada");
        assert_eq!(record.last_name, "Okafor");
        assert_eq!(record.mrn.as_deref(), Some("MRN-0042"));
        assert_eq!(record.phone.as_deref(), Some("+2348012345678"));
        assert_eq!(record.address.unwrap().city.as_deref(), Some("Lagos"));
    }

    #[test]
    fn record_tolerates_sparse_resource() {
        let sparse = fhir::Patient {
            id: Some("p-2".into()),
            ..fhir::Patient::new()
        };
        let record = PatientRecord::from_fhir(&sparse).unwrap();
        assert_eq!(record.first_name, "");
        assert!(record.phone.is_none());
    }

    #[test]
    fn update_replaces_only_named_fields() {
        let mut patient = input().to_fhir().unwrap();
        patient.id = Some("p-3".into());

        let update = PatientUpdate {
            phone: Some("+2348099999999".into()),
            ..Default::default()
        };
        let updated = update.apply(&patient).unwrap();

        let phones: Vec<_> = updated
            .telecom
            .iter()
            .filter(|t| t.system.as_deref() == Some("phone"))
            .collect();
        assert_eq!(phones.len(), 1);
        assert_eq!(phones[0].value.as_deref(), Some("+2348099999999"));
        // email untouched
        assert!(updated
            .telecom
            .iter()
            .any(|t| t.value.as_deref() == Some("ada@example.org")));
        assert_eq!(updated.gender.as_deref(), Some("female"));
    }
}
