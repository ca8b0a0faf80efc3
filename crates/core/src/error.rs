use thiserror::Error;

/// Errors from payload-to-FHIR shape translation
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

impl MappingError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
