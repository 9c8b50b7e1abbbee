//! Role Gate
//! Mission: Keep elevated operations behind an exact role match

use crate::auth::middleware::extract_claims;
use crate::auth::models::{Role, SessionClaims};
use crate::middleware::rejection::GateRejection;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

/// Whether `claims` satisfy `required_role`.
///
/// No claims means no access. The comparison is exact and case-sensitive;
/// roles form no hierarchy.
pub fn authorize(claims: Option<&SessionClaims>, required_role: &str) -> bool {
    claims.is_some_and(|claims| claims.role == required_role)
}

/// Middleware enforcing `required` on every route it wraps. Must sit inside
/// the auth middleware so claims are already attached.
///
/// ```ignore
/// .route_layer(middleware::from_fn_with_state(Role::Admin, require_role))
/// ```
pub async fn require_role(State(required): State<Role>, request: Request, next: Next) -> Response {
    let claims = extract_claims(&request);

    if authorize(claims, required.as_str()) {
        return next.run(request).await;
    }

    warn!(
        subject = claims.map(|c| c.subject.as_str()).unwrap_or("<none>"),
        required = %required,
        path = %request.uri().path(),
        "Insufficient role"
    );

    GateRejection::InsufficientRole.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn claims(role: &str) -> SessionClaims {
        SessionClaims {
            subject: "u1".to_string(),
            role: role.to_string(),
            issued_at: Utc::now(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn test_matching_role_is_allowed() {
        assert!(authorize(Some(&claims("admin")), "admin"));
        assert!(authorize(Some(&claims("user")), "user"));
    }

    #[test]
    fn test_other_role_is_denied() {
        assert!(!authorize(Some(&claims("user")), "admin"));
    }

    #[test]
    fn test_no_claims_is_denied() {
        assert!(!authorize(None, "admin"));
        assert!(!authorize(None, "user"));
    }

    #[test]
    fn test_no_hierarchy_and_exact_case() {
        assert!(!authorize(Some(&claims("admin")), "user"));
        assert!(!authorize(Some(&claims("Admin")), "admin"));
        assert!(!authorize(Some(&claims("admin ")), "admin"));
        assert!(!authorize(Some(&claims("superadmin")), "admin"));
    }
}
