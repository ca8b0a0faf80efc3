use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// FHIR Bundle types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BundleType {
    Searchset,
    History,
    Collection,
    Document,
    Message,
    Transaction,
    TransactionResponse,
    Batch,
    BatchResponse,
}

/// FHIR Bundle resource (simplified for search responses)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub resource_type: String,

    #[serde(rename = "type")]
    pub bundle_type: BundleType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<BundleLink>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,
}

/// Link within a Bundle (e.g. next page)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

/// Entry within a Bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    pub resource: JsonValue,
}

impl BundleEntry {
    pub fn new(full_url: Option<String>, resource: JsonValue) -> Self {
        Self { full_url, resource }
    }
}

impl Bundle {
    /// Create a searchset bundle from entries
    pub fn searchset(total: u32, entries: Vec<BundleEntry>) -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            bundle_type: BundleType::Searchset,
            total: Some(total),
            link: Vec::new(),
            entry: entries,
        }
    }

    /// Deserialize entries of the given resourceType into `T`, skipping
    /// anything else (Medplum searchsets can interleave OperationOutcomes).
    pub fn resources<T: serde::de::DeserializeOwned>(&self, resource_type: &str) -> Vec<T> {
        self.entry
            .iter()
            .filter(|e| {
                e.resource.get("resourceType").and_then(|t| t.as_str()) == Some(resource_type)
            })
            .filter_map(|e| serde_json::from_value(e.resource.clone()).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn searchset_round_trip() {
        let bundle = Bundle::searchset(
            1,
            vec![BundleEntry::new(
                Some("Patient/p1".into()),
                serde_json::json!({"resourceType": "Patient", "id": "p1"}),
            )],
        );
        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["resourceType"], "Bundle");
        assert_eq!(json["type"], "searchset");
        assert_eq!(json["total"], 1);

        let back: Bundle = serde_json::from_value(json).unwrap();
        assert_eq!(back.entry.len(), 1);
    }

    #[test]
    fn resources_filters_by_resource_type() {
        let bundle: Bundle = serde_json::from_value(serde_json::json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": [
                { "resource": {"resourceType": "Patient", "id": "p1"} },
                { "resource": {"resourceType": "OperationOutcome", "issue": []} }
            ]
        }))
        .unwrap();

        let patients: Vec<crate::fhir::Patient> = bundle.resources("Patient");
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].id.as_deref(), Some("p1"));
    }
}
