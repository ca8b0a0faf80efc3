//! FHIR search parameter builder

/// Accumulates query pairs for a FHIR search request.
///
/// Knows nothing about which parameters a resource supports; Medplum
/// rejects unknown ones with an OperationOutcome.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    params: Vec<(String, String)>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    /// Add the parameter only when a value is present.
    pub fn maybe_param(self, name: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.param(name, v),
            None => self,
        }
    }

    pub fn count(self, count: i64) -> Self {
        self.param("_count", count.to_string())
    }

    pub fn offset(self, offset: i64) -> Self {
        self.param("_offset", offset.to_string())
    }

    pub fn sort(self, sort: &str) -> Self {
        self.param("_sort", sort)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn as_pairs(&self) -> &[(String, String)] {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_pairs_in_order() {
        let query = SearchQuery::new()
            .param("name", "Okafor")
            .maybe_param("gender", Some("female"))
            .maybe_param("birthdate", None::<String>)
            .count(20)
            .offset(40)
            .sort("-_lastUpdated");

        assert_eq!(
            query.as_pairs(),
            &[
                ("name".to_string(), "Okafor".to_string()),
                ("gender".to_string(), "female".to_string()),
                ("_count".to_string(), "20".to_string()),
                ("_offset".to_string(), "40".to_string()),
                ("_sort".to_string(), "-_lastUpdated".to_string()),
            ]
        );
    }

    #[test]
    fn empty_query_stays_empty() {
        let query = SearchQuery::new().maybe_param("patient", None::<String>);
        assert!(query.is_empty());
    }
}
