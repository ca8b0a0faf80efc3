use axum::{
    body::Body,
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

/// API key authentication state
///
/// Two key classes: the clinic key covers staff-facing `/api` routes,
/// the integrations key covers the POCT/PACS receive webhooks. When the
/// integrations key is unset the clinic key is accepted there too. A key
/// class with no key configured is open (and warned about at startup).
#[derive(Clone)]
pub struct ApiKeyAuth {
    clinic_key: Option<String>,
    integrations_key: Option<String>,
}

impl ApiKeyAuth {
    pub fn new(clinic_key: Option<String>, integrations_key: Option<String>) -> Self {
        Self {
            clinic_key,
            integrations_key,
        }
    }

    fn check_clinic(&self, presented: Option<&str>) -> bool {
        match self.clinic_key.as_deref() {
            Some(expected) => presented == Some(expected),
            None => true,
        }
    }

    fn check_integrations(&self, presented: Option<&str>) -> bool {
        match self
            .integrations_key
            .as_deref()
            .or(self.clinic_key.as_deref())
        {
            Some(expected) => presented == Some(expected),
            None => true,
        }
    }
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-api-key").and_then(|v| v.to_str().ok())
}

fn unauthorized() -> Response {
    ApiError::Unauthorized("missing or invalid API key".to_string()).into_response()
}

/// Require the clinic API key on staff-facing routes.
pub async fn clinic_auth_middleware(request: Request<Body>, next: Next) -> Response {
    let allowed = request
        .extensions()
        .get::<ApiKeyAuth>()
        .map(|auth| auth.check_clinic(presented_key(request.headers())))
        .unwrap_or(false);

    if !allowed {
        return unauthorized();
    }
    next.run(request).await
}

/// Require the integrations API key on the receive webhooks.
pub async fn integrations_auth_middleware(request: Request<Body>, next: Next) -> Response {
    let allowed = request
        .extensions()
        .get::<ApiKeyAuth>()
        .map(|auth| auth.check_integrations(presented_key(request.headers())))
        .unwrap_or(false);

    if !allowed {
        return unauthorized();
    }
    next.run(request).await
}
