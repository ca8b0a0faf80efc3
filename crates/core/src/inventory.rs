//! Dispensary inventory mapping: stock item <-> FHIR Medication
//!
//! FHIR Medication has no stock field, so quantity on hand rides in a
//! clinic extension on the resource.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::MappingError;
use crate::fhir::{self, CodeableConcept, Extension, MedicationBatch, STOCK_EXTENSION_URL};

/// Identifier system for the clinic's own formulary codes.
pub const FORMULARY_SYSTEM: &str = "https://clinic-gateway.dev/fhir/identifiers/formulary";

/// Payload accepted by POST /api/inventory
#[derive(Debug, Clone, Deserialize)]
pub struct MedicationInput {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default)]
    pub lot_number: Option<String>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
    pub quantity: i64,
}

impl MedicationInput {
    pub fn to_fhir(&self) -> Result<fhir::Medication, MappingError> {
        if self.name.trim().is_empty() {
            return Err(MappingError::MissingField("name"));
        }
        if self.quantity < 0 {
            return Err(MappingError::invalid("quantity", "cannot be negative"));
        }

        let mut medication = fhir::Medication::new();
        medication.code = Some(match self.code {
            Some(ref code) => CodeableConcept::coded(FORMULARY_SYSTEM, code, &self.name),
            None => CodeableConcept::text(&self.name),
        });
        medication.status = Some("active".into());
        medication.form = self.form.as_deref().map(CodeableConcept::text);
        if self.lot_number.is_some() || self.expiration_date.is_some() {
            medication.batch = Some(MedicationBatch {
                lot_number: self.lot_number.clone(),
                expiration_date: self.expiration_date,
            });
        }
        medication.extension = vec![Extension::integer(STOCK_EXTENSION_URL, self.quantity)];
        Ok(medication)
    }
}

/// Application view of a stock item
#[derive(Debug, Clone, Serialize)]
pub struct MedicationRecord {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<NaiveDate>,
    pub quantity: i64,
}

impl MedicationRecord {
    pub fn from_fhir(medication: &fhir::Medication) -> Result<Self, MappingError> {
        let id = medication
            .id
            .clone()
            .ok_or(MappingError::MissingField("id"))?;
        Ok(Self {
            id,
            name: medication
                .code
                .as_ref()
                .and_then(|c| c.display())
                .unwrap_or_default()
                .to_string(),
            code: medication
                .code
                .as_ref()
                .and_then(|c| c.code())
                .map(str::to_string),
            form: medication
                .form
                .as_ref()
                .and_then(|f| f.display())
                .map(str::to_string),
            lot_number: medication
                .batch
                .as_ref()
                .and_then(|b| b.lot_number.clone()),
            expiration_date: medication.batch.as_ref().and_then(|b| b.expiration_date),
            quantity: fhir::extension_integer(&medication.extension, STOCK_EXTENSION_URL)
                .unwrap_or(0),
        })
    }
}

/// Payload accepted by PATCH /api/inventory/{id}: a signed stock delta
/// (dispense negative, restock positive).
#[derive(Debug, Clone, Deserialize)]
pub struct StockAdjustment {
    pub delta: i64,
}

impl StockAdjustment {
    /// Apply the delta against the stored resource; stock can never go
    /// below zero.
    pub fn apply(&self, current: &fhir::Medication) -> Result<fhir::Medication, MappingError> {
        let stock = fhir::extension_integer(&current.extension, STOCK_EXTENSION_URL).unwrap_or(0);
        let next = stock + self.delta;
        if next < 0 {
            return Err(MappingError::invalid(
                "delta",
                format!("would drive stock below zero ({} {:+})", stock, self.delta),
            ));
        }

        let mut updated = current.clone();
        updated
            .extension
            .retain(|e| e.url != STOCK_EXTENSION_URL);
        updated
            .extension
            .push(Extension::integer(STOCK_EXTENSION_URL, next));
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> MedicationInput {
        MedicationInput {
            name: "Artemether/Lumefantrine 20/120mg".into(),
            code: Some("AL-20-120".into()),
            form: Some("tablet".into()),
            lot_number: Some("B2026-14".into()),
            expiration_date: NaiveDate::from_ymd_opt(2027, 6, 30),
            quantity: 120,
        }
    }

    #[test]
    fn shapes_stock_item_into_medication() {
        let json = serde_json::to_value(input().to_fhir().unwrap()).unwrap();
        assert_eq!(json["resourceType"], "Medication");
        assert_eq!(json["code"]["coding"][0]["system"], FORMULARY_SYSTEM);
        assert_eq!(json["code"]["coding"][0]["code"], "AL-20-120");
        assert_eq!(json["batch"]["lotNumber"], "B2026-14");
        assert_eq!(json["batch"]["expirationDate"], "2027-06-30");
        assert_eq!(json["extension"][0]["url"], STOCK_EXTENSION_URL);
        assert_eq!(json["extension"][0]["valueInteger"], 120);
    }

    #[test]
    fn rejects_negative_initial_stock() {
        let mut bad = input();
        bad.quantity = -1;
        assert!(bad.to_fhir().is_err());
    }

    #[test]
    fn record_reads_stock_from_extension() {
        let mut medication = input().to_fhir().unwrap();
        medication.id = Some("m-1".into());
        let record = MedicationRecord::from_fhir(&medication).unwrap();
        assert_eq!(record.quantity, 120);
        assert_eq!(record.name, "Artemether/Lumefantrine 20/120mg");
        assert_eq!(record.lot_number.as_deref(), Some("B2026-14"));
    }

    #[test]
    fn adjustment_dispenses_and_restocks() {
        let medication = input().to_fhir().unwrap();

        let dispensed = StockAdjustment { delta: -20 }.apply(&medication).unwrap();
        assert_eq!(
            fhir::extension_integer(&dispensed.extension, STOCK_EXTENSION_URL),
            Some(100)
        );

        let restocked = StockAdjustment { delta: 50 }.apply(&dispensed).unwrap();
        assert_eq!(
            fhir::extension_integer(&restocked.extension, STOCK_EXTENSION_URL),
            Some(150)
        );
    }

    #[test]
    fn adjustment_refuses_overdraw() {
        let medication = input().to_fhir().unwrap();
        let result = StockAdjustment { delta: -121 }.apply(&medication);
        assert!(matches!(
            result,
            Err(MappingError::InvalidField { field: "delta", .. })
        ));
    }
}
