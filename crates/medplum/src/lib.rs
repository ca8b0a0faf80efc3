//! medplum-client: async REST client for the Medplum FHIR API
//!
//! All persistence in the gateway goes through this crate: resources are
//! created, read, updated and searched over Medplum's FHIR R4 endpoint,
//! authenticated with an OAuth2 client-credentials token that is cached
//! and refreshed as it nears expiry.

mod client;
mod error;
mod search;

pub use client::MedplumClient;
pub use error::MedplumError;
pub use search::SearchQuery;
