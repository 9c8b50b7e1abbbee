//! Gate rejections.
//!
//! Every way the admission/trust layer can stop a request, with the status
//! code and machine-stable reason it maps to at the HTTP boundary.

use crate::auth::jwt::VerificationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    RateLimited,
    MissingCredential,
    MalformedCredential,
    InvalidSignature,
    Expired,
    InsufficientRole,
}

impl GateRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            GateRejection::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GateRejection::MissingCredential
            | GateRejection::MalformedCredential
            | GateRejection::InvalidSignature
            | GateRejection::Expired => StatusCode::UNAUTHORIZED,
            GateRejection::InsufficientRole => StatusCode::FORBIDDEN,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            GateRejection::RateLimited => "rate_limited",
            GateRejection::MissingCredential => "missing_credential",
            GateRejection::MalformedCredential => "malformed_credential",
            GateRejection::InvalidSignature => "invalid_signature",
            GateRejection::Expired => "expired_credential",
            GateRejection::InsufficientRole => "insufficient_role",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            GateRejection::RateLimited => "The API is at capacity, try again later.",
            GateRejection::MissingCredential => "Missing authorization token",
            GateRejection::MalformedCredential => {
                "Invalid authorization format. Use: Bearer {token}"
            }
            GateRejection::InvalidSignature => "Invalid token",
            GateRejection::Expired => "Token has expired",
            GateRejection::InsufficientRole => "Insufficient privileges",
        }
    }
}

impl From<VerificationError> for GateRejection {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::MissingCredential => GateRejection::MissingCredential,
            VerificationError::MalformedCredential => GateRejection::MalformedCredential,
            VerificationError::InvalidSignature => GateRejection::InvalidSignature,
            VerificationError::Expired => GateRejection::Expired,
        }
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.reason(),
            "message": self.message(),
        });

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_statuses() {
        assert_eq!(
            GateRejection::RateLimited.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        for rejection in [
            GateRejection::MissingCredential,
            GateRejection::MalformedCredential,
            GateRejection::InvalidSignature,
            GateRejection::Expired,
        ] {
            assert_eq!(rejection.into_response().status(), StatusCode::UNAUTHORIZED);
        }
        assert_eq!(
            GateRejection::InsufficientRole.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_rate_limited_has_no_retry_after() {
        let response = GateRejection::RateLimited.into_response();
        assert!(response.headers().get("retry-after").is_none());
    }

    #[test]
    fn test_verification_errors_map_one_to_one() {
        assert_eq!(
            GateRejection::from(VerificationError::Expired),
            GateRejection::Expired
        );
        assert_eq!(
            GateRejection::from(VerificationError::InvalidSignature).reason(),
            "invalid_signature"
        );
    }
}
