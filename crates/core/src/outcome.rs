use serde::{Deserialize, Serialize};

/// Severity of the issue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

/// Type of issue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    Invalid,
    Structure,
    Required,
    Value,
    Security,
    Login,
    Expired,
    Forbidden,
    Processing,
    NotSupported,
    Duplicate,
    NotFound,
    BusinessRule,
    Conflict,
    Transient,
    Exception,
    Timeout,
    Throttled,
    Informational,
    // Catch-all so unrecognized Medplum issue codes still decode
    #[serde(other)]
    Unknown,
}

/// A single issue within an OperationOutcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationOutcomeIssue {
    pub severity: IssueSeverity,
    pub code: IssueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

/// FHIR OperationOutcome resource
///
/// Medplum reports request failures with this shape; we decode it to
/// surface the diagnostics in our own error responses and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub resource_type: String,
    #[serde(default)]
    pub issue: Vec<OperationOutcomeIssue>,
}

impl OperationOutcome {
    pub fn error(code: IssueType, diagnostics: &str) -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            issue: vec![OperationOutcomeIssue {
                severity: IssueSeverity::Error,
                code,
                diagnostics: Some(diagnostics.to_string()),
            }],
        }
    }

    pub fn invalid(diagnostics: &str) -> Self {
        Self::error(IssueType::Invalid, diagnostics)
    }

    pub fn not_found(diagnostics: &str) -> Self {
        Self::error(IssueType::NotFound, diagnostics)
    }

    /// Diagnostics of the first issue, if present.
    pub fn first_message(&self) -> Option<&str> {
        self.issue.first().and_then(|i| i.diagnostics.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_medplum_error_body() {
        let json = serde_json::json!({
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": "error",
                "code": "not-found",
                "diagnostics": "Not found"
            }]
        });
        let outcome: OperationOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(outcome.issue[0].code, IssueType::NotFound);
        assert_eq!(outcome.first_message(), Some("Not found"));
    }

    #[test]
    fn unrecognized_issue_code_decodes_as_unknown() {
        let json = serde_json::json!({
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": "error",
                "code": "some-new-code",
                "diagnostics": "future Medplum speaks"
            }]
        });
        let outcome: OperationOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(outcome.issue[0].code, IssueType::Unknown);
    }
}
