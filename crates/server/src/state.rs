use medplum_client::MedplumClient;

use crate::ai::AiClient;

/// Shared application state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub medplum: MedplumClient,
    /// None when no AI provider key is configured
    pub ai: Option<AiClient>,
}
