//! Authentication Middleware
//! Mission: Protect API endpoints with credential validation

use crate::auth::{jwt::CredentialValidator, models::SessionClaims};
use crate::middleware::rejection::GateRejection;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Auth middleware that validates bearer credentials.
///
/// On success the request carries [`SessionClaims`] in its extensions. On any
/// failure nothing is attached and the request ends with 401.
pub async fn auth_middleware(
    State(validator): State<Arc<CredentialValidator>>,
    mut req: Request,
    next: Next,
) -> Result<Response, GateRejection> {
    let credential = bearer_credential(req.headers())?;

    let claims = validator
        .validate(credential, Utc::now())
        .map_err(|e| {
            debug!(reason = %e, path = %req.uri().path(), "Credential rejected");
            GateRejection::from(e)
        })?;

    // Add claims to request extensions so handlers can access them
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Pull the token out of `Authorization: Bearer <token>`.
///
/// An absent header is a missing credential; a header in any other shape is
/// malformed. An empty token is left for the validator to report as missing.
fn bearer_credential(headers: &HeaderMap) -> Result<&str, GateRejection> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Err(GateRejection::MissingCredential);
    };

    let value = value
        .to_str()
        .map_err(|_| GateRejection::MalformedCredential)?;

    if value.trim().is_empty() {
        return Err(GateRejection::MissingCredential);
    }

    value
        .strip_prefix("Bearer ")
        .ok_or(GateRejection::MalformedCredential)
}

/// Extract claims from request (use after auth middleware)
pub fn extract_claims(req: &Request) -> Option<&SessionClaims> {
    req.extensions().get::<SessionClaims>()
}
