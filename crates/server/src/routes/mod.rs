mod appointments;
mod billing;
mod consultations;
pub mod health;
mod imaging;
mod inventory;
mod labs;
pub mod metrics;
mod patients;
mod referrals;
mod soap;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::state::AppState;

/// Staff-facing API routes (clinic API key)
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/patients", get(patients::search).post(patients::create))
        .route(
            "/patients/{id}",
            get(patients::read).patch(patients::update),
        )
        .route(
            "/consultations",
            get(consultations::list).post(consultations::create),
        )
        .route("/consultations/queue", get(consultations::queue))
        .route("/consultations/{id}", get(consultations::read))
        .route(
            "/consultations/{id}/status",
            patch(consultations::update_status),
        )
        .route(
            "/appointments",
            get(appointments::list).post(appointments::create),
        )
        .route(
            "/appointments/{id}",
            get(appointments::read).patch(appointments::update_status),
        )
        .route("/referrals", get(referrals::list).post(referrals::create))
        .route("/labs/orders", post(labs::create_order))
        .route("/labs/results", get(labs::list_results))
        .route("/labs/results/{id}", get(labs::read_result))
        .route("/imaging/orders", post(imaging::create_order))
        .route("/imaging/studies", get(imaging::list_studies))
        .route("/inventory", get(inventory::list).post(inventory::create))
        .route(
            "/inventory/{id}",
            get(inventory::read).patch(inventory::adjust),
        )
        .route("/billing/charges", get(billing::list).post(billing::create))
        .route("/soap-rewrite", post(soap::rewrite))
}

/// Webhook routes for external lab/imaging systems (integrations API key)
pub fn receive_routes() -> Router<AppState> {
    Router::new()
        .route("/labs/receive", post(labs::receive))
        .route("/imaging/receive", post(imaging::receive))
}
