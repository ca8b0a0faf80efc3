//! AI features: SOAP note restructuring via an OpenAI-compatible provider

pub mod client;
pub mod soap;

pub use client::AiClient;
