//! clinic-server library crate
//!
//! Exposes `build_app` and `config` for integration tests.
//! The actual binary entrypoint is in `main.rs`.

mod ai;
pub mod config;
mod error;
mod middleware;
mod routes;
mod state;

use axum::{Extension, Router, middleware as axum_mw, routing::get};
use medplum_client::MedplumClient;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use middleware::ApiKeyAuth;
use state::AppState;

/// Build the full application router with all routes and middleware.
///
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a TCP port.
pub fn build_app(medplum: MedplumClient, config: &Config) -> Router {
    // Create auth state
    let auth = ApiKeyAuth::new(config.api_key.clone(), config.integrations_api_key.clone());

    // Create rate limiter
    let rate_limiter = middleware::create_rate_limiter(config.rate_limit_rps);

    // Pick an AI provider: OpenRouter first, Groq as fallback, None if
    // neither key is set (the rewrite endpoint then returns 503).
    let ai_client = match (&config.openrouter_api_key, &config.groq_api_key) {
        (Some(key), _) => Some(ai::AiClient::openrouter(key.clone())),
        (None, Some(key)) => Some(ai::AiClient::groq(key.clone())),
        (None, None) => None,
    };

    let app_state = AppState {
        medplum,
        ai: ai_client,
    };

    // Staff routes (clinic API key) plus the lab/imaging receive
    // webhooks (integrations key), both rate limited.
    let protected_routes = Router::new()
        .merge(
            routes::api_routes().layer(axum_mw::from_fn(middleware::auth::clinic_auth_middleware)),
        )
        .merge(
            routes::receive_routes()
                .layer(axum_mw::from_fn(middleware::auth::integrations_auth_middleware)),
        )
        .layer(Extension(auth))
        .layer(axum_mw::from_fn(middleware::rate_limit_middleware))
        .layer(Extension(rate_limiter));

    // Install Prometheus metrics recorder.
    // Use build_recorder() + set_global_recorder() so that repeated calls
    // (e.g. in integration tests) don't panic — the second install is
    // silently ignored and we still get a valid handle for /metrics.
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    let prometheus_handle = recorder.handle();
    let _ = metrics::set_global_recorder(recorder);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(routes::health::check))
        .route("/metrics", get(routes::metrics::get))
        .layer(Extension(prometheus_handle));

    // Build CORS layer
    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Build application
    Router::new()
        .merge(public_routes)
        .nest("/api", protected_routes)
        .with_state(app_state)
        .layer(axum_mw::from_fn(middleware::audit_middleware))
        .layer(axum_mw::from_fn(middleware::request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum_mw::from_fn(middleware::metrics_middleware))
}
