//! clinic-server: Medplum-backed clinic API gateway binary entrypoint.

use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinic_server::config::Config;
use medplum_client::MedplumClient;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Invalid configuration");

    // Create the upstream FHIR client
    let medplum = MedplumClient::new(
        &config.medplum_base_url,
        &config.medplum_client_id,
        &config.medplum_client_secret,
    );

    // Log startup info
    if config.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!("API key authentication disabled (no API_KEY env var)");
    }
    if config.integrations_api_key.is_some() {
        tracing::info!("Separate integrations key configured for receive webhooks");
    }
    if config.openrouter_api_key.is_some() {
        tracing::info!("OpenRouter API key configured, SOAP rewriting enabled");
    } else if config.groq_api_key.is_some() {
        tracing::info!("Groq API key configured, SOAP rewriting enabled");
    } else {
        tracing::warn!("No AI provider key set, SOAP rewriting disabled");
    }
    tracing::info!("Rate limiting: {} requests/second", config.rate_limit_rps);
    tracing::info!("Upstream Medplum: {}", config.medplum_base_url);

    // Build application
    let app = clinic_server::build_app(medplum, &config);

    // Start server
    let addr: SocketAddr = config.bind_address.parse().expect("Invalid bind address");
    tracing::info!("Starting clinic gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    tracing::info!("Server shutdown complete");
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
