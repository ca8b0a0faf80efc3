//! Server configuration

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub medplum_base_url: String,
    pub medplum_client_id: String,
    pub medplum_client_secret: String,
    /// Shared key for clinic staff clients (`x-api-key`)
    pub api_key: Option<String>,
    /// Separate key for the POCT/PACS receive webhooks
    pub integrations_api_key: Option<String>,
    pub cors_origins: Vec<String>,
    pub rate_limit_rps: u32,
    pub openrouter_api_key: Option<String>,
    pub groq_api_key: Option<String>,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment variables. Medplum credentials
    /// are required; everything else has a default or is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let rate_limit_rps = match optional("RATE_LIMIT_RPS") {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|e| ConfigError::Invalid("RATE_LIMIT_RPS", e.to_string()))?,
            None => 50,
        };
        if rate_limit_rps == 0 {
            return Err(ConfigError::Invalid(
                "RATE_LIMIT_RPS",
                "must be at least 1".into(),
            ));
        }

        let cors_origins = optional("CORS_ORIGINS")
            .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|| vec!["*".to_string()]);

        Ok(Self {
            bind_address: optional("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".into()),
            medplum_base_url: optional("MEDPLUM_BASE_URL")
                .unwrap_or_else(|| "https://api.medplum.com".into()),
            medplum_client_id: required("MEDPLUM_CLIENT_ID")?,
            medplum_client_secret: required("MEDPLUM_CLIENT_SECRET")?,
            api_key: optional("API_KEY"),
            integrations_api_key: optional("INTEGRATIONS_API_KEY"),
            cors_origins,
            rate_limit_rps,
            openrouter_api_key: optional("OPENROUTER_API_KEY"),
            groq_api_key: optional("GROQ_API_KEY"),
        })
    }
}
