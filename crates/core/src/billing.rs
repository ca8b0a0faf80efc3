//! Billing mapping: consultation charges <-> FHIR ChargeItem

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MappingError;
use crate::fhir::{self, CodeableConcept, Money, Quantity, Reference};

/// Identifier system for the clinic's charge master codes.
pub const CHARGE_SYSTEM: &str = "https://clinic-gateway.dev/fhir/identifiers/charges";

fn default_quantity() -> f64 {
    1.0
}

fn default_currency() -> String {
    "USD".into()
}

/// Payload accepted by POST /api/billing/charges
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeInput {
    pub patient_id: String,
    #[serde(default)]
    pub encounter_id: Option<String>,
    pub code: String,
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl ChargeInput {
    pub fn to_fhir(&self) -> Result<fhir::ChargeItem, MappingError> {
        if self.patient_id.trim().is_empty() {
            return Err(MappingError::MissingField("patient_id"));
        }
        if self.code.trim().is_empty() {
            return Err(MappingError::MissingField("code"));
        }
        if self.quantity <= 0.0 {
            return Err(MappingError::invalid("quantity", "must be positive"));
        }
        if self.unit_price < 0.0 {
            return Err(MappingError::invalid("unit_price", "cannot be negative"));
        }

        let mut charge = fhir::ChargeItem::new();
        charge.status = "billable".into();
        charge.code = CodeableConcept::coded(CHARGE_SYSTEM, &self.code, &self.description);
        charge.subject = Some(Reference::local("Patient", &self.patient_id));
        charge.context = self
            .encounter_id
            .as_ref()
            .map(|id| Reference::local("Encounter", id));
        charge.occurrence_date_time = Some(Utc::now());
        charge.quantity = Some(Quantity {
            value: Some(self.quantity),
            unit: None,
        });
        // priceOverride carries the extended amount (quantity x unit price)
        charge.price_override = Some(Money {
            value: Some(self.quantity * self.unit_price),
            currency: Some(self.currency.clone()),
        });
        Ok(charge)
    }
}

/// Application view of a stored charge
#[derive(Debug, Clone, Serialize)]
pub struct ChargeRecord {
    pub id: String,
    pub status: String,
    pub patient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounter_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub quantity: f64,
    pub amount: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charged_at: Option<DateTime<Utc>>,
}

impl ChargeRecord {
    pub fn from_fhir(charge: &fhir::ChargeItem) -> Result<Self, MappingError> {
        let id = charge.id.clone().ok_or(MappingError::MissingField("id"))?;
        let patient_id = charge
            .subject
            .as_ref()
            .and_then(|s| s.id())
            .ok_or(MappingError::MissingField("subject"))?
            .to_string();

        Ok(Self {
            id,
            status: charge.status.clone(),
            patient_id,
            encounter_id: charge
                .context
                .as_ref()
                .and_then(|c| c.id())
                .map(str::to_string),
            code: charge.code.code().map(str::to_string),
            description: charge.code.display().map(str::to_string),
            quantity: charge
                .quantity
                .as_ref()
                .and_then(|q| q.value)
                .unwrap_or(1.0),
            amount: charge
                .price_override
                .as_ref()
                .and_then(|m| m.value)
                .unwrap_or(0.0),
            currency: charge
                .price_override
                .as_ref()
                .and_then(|m| m.currency.clone())
                .unwrap_or_else(default_currency),
            charged_at: charge.occurrence_date_time,
        })
    }
}

/// Invoice summary for a set of charges (one encounter's bill).
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceSummary {
    pub total: f64,
    pub currency: String,
    pub line_count: usize,
}

impl InvoiceSummary {
    /// Sum charges. Currency is taken from the first line; mixed-currency
    /// bills do not occur within one clinic.
    pub fn of(charges: &[ChargeRecord]) -> Self {
        Self {
            total: charges.iter().map(|c| c.amount).sum(),
            currency: charges
                .first()
                .map(|c| c.currency.clone())
                .unwrap_or_else(default_currency),
            line_count: charges.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ChargeInput {
        ChargeInput {
            patient_id: "p-1".into(),
            encounter_id: Some("e-2".into()),
            code: "CONS-GP".into(),
            description: "General consultation".into(),
            quantity: 1.0,
            unit_price: 25.0,
            currency: "USD".into(),
        }
    }

    #[test]
    fn shapes_charge_into_charge_item() {
        let json = serde_json::to_value(input().to_fhir().unwrap()).unwrap();
        assert_eq!(json["resourceType"], "ChargeItem");
        assert_eq!(json["status"], "billable");
        assert_eq!(json["code"]["coding"][0]["code"], "CONS-GP");
        assert_eq!(json["subject"]["reference"], "Patient/p-1");
        assert_eq!(json["context"]["reference"], "Encounter/e-2");
        assert_eq!(json["priceOverride"]["value"], 25.0);
        assert_eq!(json["priceOverride"]["currency"], "USD");
    }

    #[test]
    fn extended_amount_multiplies_quantity() {
        let mut charge = input();
        charge.quantity = 3.0;
        charge.unit_price = 4.5;
        let fhir_charge = charge.to_fhir().unwrap();
        assert_eq!(
            fhir_charge.price_override.as_ref().unwrap().value,
            Some(13.5)
        );
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let mut bad = input();
        bad.quantity = 0.0;
        assert!(bad.to_fhir().is_err());
    }

    #[test]
    fn invoice_sums_lines() {
        let mut a = input().to_fhir().unwrap();
        a.id = Some("c-1".into());
        let mut b = input();
        b.code = "LAB-CBC".into();
        b.unit_price = 10.0;
        let mut b = b.to_fhir().unwrap();
        b.id = Some("c-2".into());

        let records = vec![
            ChargeRecord::from_fhir(&a).unwrap(),
            ChargeRecord::from_fhir(&b).unwrap(),
        ];
        let invoice = InvoiceSummary::of(&records);
        assert_eq!(invoice.total, 35.0);
        assert_eq!(invoice.currency, "USD");
        assert_eq!(invoice.line_count, 2);
    }

    #[test]
    fn empty_invoice_is_zero() {
        let invoice = InvoiceSummary::of(&[]);
        assert_eq!(invoice.total, 0.0);
        assert_eq!(invoice.line_count, 0);
    }
}
