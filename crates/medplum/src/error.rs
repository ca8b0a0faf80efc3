use clinic_core::OperationOutcome;
use thiserror::Error;

/// Errors from talking to the Medplum FHIR API
#[derive(Debug, Error)]
pub enum MedplumError {
    #[error("authentication with Medplum failed: {0}")]
    Auth(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Medplum returned {status}")]
    Status {
        status: u16,
        outcome: Option<OperationOutcome>,
    },

    #[error("failed to decode Medplum response: {0}")]
    Decode(String),
}

impl MedplumError {
    /// Status code of an upstream FHIR error, if that is what this is.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Diagnostics text from the upstream OperationOutcome, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Status { outcome, .. } => outcome.as_ref().and_then(|o| o.first_message()),
            _ => None,
        }
    }
}
