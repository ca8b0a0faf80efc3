//! Medplum REST client with OAuth2 client-credentials auth

use std::sync::Arc;
use std::time::{Duration, Instant};

use clinic_core::{Bundle, OperationOutcome};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::MedplumError;
use crate::search::SearchQuery;

/// Refresh the token this long before it actually expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<CachedToken>>,
}

/// Async client for the Medplum FHIR R4 API.
///
/// Cheap to clone; the token cache is shared across clones.
#[derive(Clone)]
pub struct MedplumClient {
    inner: Arc<Inner>,
}

impl MedplumClient {
    pub fn new(base_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                base_url: base_url.trim_end_matches('/').to_string(),
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
                token: RwLock::new(None),
            }),
        }
    }

    fn fhir_url(&self, path: &str) -> String {
        format!("{}/fhir/R4/{}", self.inner.base_url, path)
    }

    /// Current access token, fetching or refreshing as needed.
    async fn access_token(&self) -> Result<String, MedplumError> {
        if let Some(token) = self.inner.token.read().await.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        // Take the write lock and re-check so concurrent requests do not
        // stampede the token endpoint.
        let mut guard = self.inner.token.write().await;
        if let Some(token) = guard.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.fetch_token().await?;
        let access_token = token.access_token.clone();
        *guard = Some(token);
        Ok(access_token)
    }

    async fn fetch_token(&self) -> Result<CachedToken, MedplumError> {
        let url = format!("{}/oauth2/token", self.inner.base_url);
        tracing::debug!(url = %url, client_id = %self.inner.client_id, "Fetching Medplum access token");

        let response = self
            .inner
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.inner.client_id.as_str()),
                ("client_secret", self.inner.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MedplumError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MedplumError::Decode(format!("token response: {}", e)))?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    /// Turn a non-2xx FHIR response into a typed error, decoding the
    /// OperationOutcome body when Medplum sends one.
    async fn error_from(response: reqwest::Response) -> MedplumError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let outcome = serde_json::from_str::<OperationOutcome>(&body).ok();
        if outcome.is_none() {
            tracing::warn!(status, body = %body, "Medplum error without OperationOutcome body");
        }
        MedplumError::Status { status, outcome }
    }

    async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, MedplumError> {
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        response
            .json::<R>()
            .await
            .map_err(|e| MedplumError::Decode(e.to_string()))
    }

    /// POST a new resource; returns the stored resource (with server id).
    pub async fn create<T, R>(&self, resource_type: &str, resource: &T) -> Result<R, MedplumError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let token = self.access_token().await?;
        let response = self
            .inner
            .http
            .post(self.fhir_url(resource_type))
            .bearer_auth(token)
            .json(resource)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// GET a resource by id.
    pub async fn read<R: DeserializeOwned>(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<R, MedplumError> {
        let token = self.access_token().await?;
        let response = self
            .inner
            .http
            .get(self.fhir_url(&format!("{}/{}", resource_type, id)))
            .bearer_auth(token)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// PUT a full resource update; returns the stored resource.
    pub async fn update<T, R>(
        &self,
        resource_type: &str,
        id: &str,
        resource: &T,
    ) -> Result<R, MedplumError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let token = self.access_token().await?;
        let response = self
            .inner
            .http
            .put(self.fhir_url(&format!("{}/{}", resource_type, id)))
            .bearer_auth(token)
            .json(resource)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Search a resource type, returning the raw searchset Bundle.
    pub async fn search(
        &self,
        resource_type: &str,
        query: &SearchQuery,
    ) -> Result<Bundle, MedplumError> {
        let token = self.access_token().await?;
        let mut request = self
            .inner
            .http
            .get(self.fhir_url(resource_type))
            .bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query.as_pairs());
        }
        let response = request.send().await?;
        Self::decode(response).await
    }

    /// Reachability probe against the public metadata endpoint.
    pub async fn ping(&self) -> Result<(), MedplumError> {
        let response = self
            .inner
            .http
            .get(self.fhir_url("metadata"))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_core::fhir;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "test-token",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn create_sends_bearer_token_and_decodes_resource() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/fhir/R4/Patient"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "resourceType": "Patient",
                "id": "p-1",
                "gender": "female"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = MedplumClient::new(&server.uri(), "cid", "secret");
        let mut patient = fhir::Patient::new();
        patient.gender = Some("female".into());

        let created: fhir::Patient = client.create("Patient", &patient).await.unwrap();
        assert_eq!(created.id.as_deref(), Some("p-1"));
    }

    #[tokio::test]
    async fn token_is_cached_across_requests() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/fhir/R4/Patient/p-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resourceType": "Patient",
                "id": "p-1"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = MedplumClient::new(&server.uri(), "cid", "secret");
        let _: fhir::Patient = client.read("Patient", "p-1").await.unwrap();
        let _: fhir::Patient = client.read("Patient", "p-1").await.unwrap();
        // token mock expects exactly one call; MockServer verifies on drop
    }

    #[tokio::test]
    async fn search_sends_query_pairs() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/fhir/R4/Patient"))
            .and(query_param("name", "Okafor"))
            .and(query_param("_count", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resourceType": "Bundle",
                "type": "searchset",
                "total": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = MedplumClient::new(&server.uri(), "cid", "secret");
        let query = SearchQuery::new().param("name", "Okafor").count(10);
        let bundle = client.search("Patient", &query).await.unwrap();
        assert_eq!(bundle.total, Some(0));
    }

    #[tokio::test]
    async fn upstream_outcome_is_decoded_into_status_error() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/fhir/R4/Patient/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "resourceType": "OperationOutcome",
                "issue": [{
                    "severity": "error",
                    "code": "not-found",
                    "diagnostics": "Not found"
                }]
            })))
            .mount(&server)
            .await;

        let client = MedplumClient::new(&server.uri(), "cid", "secret");
        let err = client
            .read::<fhir::Patient>("Patient", "missing")
            .await
            .unwrap_err();
        assert_eq!(err.upstream_status(), Some(404));
        assert_eq!(err.diagnostics(), Some("Not found"));
    }

    #[tokio::test]
    async fn auth_failure_surfaces_as_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let client = MedplumClient::new(&server.uri(), "cid", "bad-secret");
        let err = client
            .read::<fhir::Patient>("Patient", "p-1")
            .await
            .unwrap_err();
        assert!(matches!(err, MedplumError::Auth(_)));
    }
}
