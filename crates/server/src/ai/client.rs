//! Chat-completions client for OpenAI-compatible providers
//!
//! OpenRouter is the primary provider; Groq is used when only a Groq key
//! is configured. Both speak the same chat/completions scheme.

use serde::{Deserialize, Serialize};

const OPENROUTER_BASE: &str = "https://openrouter.ai/api/v1";
const OPENROUTER_MODEL: &str = "openai/gpt-4o-mini";

const GROQ_BASE: &str = "https://api.groq.com/openai/v1";
const GROQ_MODEL: &str = "llama-3.3-70b-versatile";

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Request body for the chat completions API
#[derive(Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Error detail from the provider
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for one configured provider
#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AiClient {
    pub fn openrouter(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: OPENROUTER_BASE.to_string(),
            api_key,
            model: OPENROUTER_MODEL.to_string(),
        }
    }

    pub fn groq(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: GROQ_BASE.to_string(),
            api_key,
            model: GROQ_MODEL.to_string(),
        }
    }

    /// Point the client at a mock provider endpoint.
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Send a system + user message pair, return the text of the reply.
    pub async fn chat(&self, system: &str, user: &str) -> Result<String, String> {
        let request = ApiRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: 2048,
            temperature: 0.2,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if let Ok(api_err) = serde_json::from_str::<ApiError>(&body) {
                return Err(format!(
                    "AI provider error ({}): {}",
                    status, api_err.error.message
                ));
            }
            return Err(format!("AI provider error ({}): {}", status, body));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| "No choices in response".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn chat_returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("\"role\":\"system\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}}]
            })))
            .mount(&server)
            .await;

        let client = AiClient::openrouter("key".into()).with_base_url(&server.uri());
        let reply = client.chat("be brief", "hi").await.unwrap();
        assert_eq!(reply, "hello");
    }

    #[tokio::test]
    async fn provider_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "rate limited"}
            })))
            .mount(&server)
            .await;

        let client = AiClient::groq("key".into()).with_base_url(&server.uri());
        let err = client.chat("s", "u").await.unwrap_err();
        assert!(err.contains("rate limited"));
    }
}
