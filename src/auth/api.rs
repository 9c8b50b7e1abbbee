//! Authentication API Endpoints
//! Mission: Provide registration, login and identity endpoints

use crate::auth::{
    jwt::CredentialIssuer,
    models::{LoginRequest, LoginResponse, RegisterRequest, Role, SessionClaims, User},
    user_store::{CreateUserError, UserStore},
};
use crate::models::{ApiError, SuccessResponse, ValidationError};
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

const MIN_PASSWORD_LEN: usize = 8;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub issuer: Arc<CredentialIssuer>,
    /// Whether `/register` may create admin accounts.
    pub allow_admin_signup: bool,
}

/// Register endpoint - POST /api/v1/users/register
pub async fn register(
    State(state): State<AuthState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse<Value>>, ApiError> {
    let Json(payload) = payload?;
    let email = payload.email.trim().to_string();

    let mut errors = Vec::new();
    if email.is_empty() {
        errors.push(ValidationError::new("email", "Email is required"));
    } else if !email.contains('@') {
        errors.push(ValidationError::new("email", "Email is invalid"));
    }
    if payload.password.is_empty() {
        errors.push(ValidationError::new("password", "Password is required"));
    } else if payload.password.len() < MIN_PASSWORD_LEN {
        errors.push(ValidationError::new(
            "password",
            "Password must be at least 8 characters",
        ));
    }

    let role = match payload.role.as_deref().map(str::trim) {
        None | Some("") => Some(Role::User),
        Some(raw) => raw.parse::<Role>().ok(),
    };
    if role.is_none() {
        errors.push(ValidationError::new("role", "Role must be one of: user, admin"));
    }

    let role = match role {
        Some(role) if errors.is_empty() => role,
        _ => return Err(ApiError::Validation(errors)),
    };

    if role == Role::Admin && !state.allow_admin_signup {
        warn!("❌ Rejected admin self-registration for {}", email);
        return Err(ApiError::Forbidden(
            "Admin accounts cannot be self-registered".to_string(),
        ));
    }

    let store = state.user_store.clone();
    let password = payload.password;
    let created = tokio::task::spawn_blocking(move || store.create_user(&email, &password, role))
        .await
        .map_err(|e| ApiError::internal("Failed to create user", e))?;

    let user = match created {
        Ok(user) => user,
        Err(CreateUserError::EmailTaken) => {
            return Err(ApiError::Conflict("Email already registered".to_string()))
        }
        Err(CreateUserError::Other(e)) => return Err(ApiError::internal("Failed to create user", e)),
    };

    Ok(SuccessResponse::with_data(
        "User registered successfully",
        json!({ "user_id": user.id }),
    ))
}

/// Login endpoint - POST /api/v1/users/login
pub async fn login(
    State(state): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse<LoginResponse>>, ApiError> {
    let Json(payload) = payload?;
    let email = payload.email.trim().to_string();

    let mut errors = Vec::new();
    if email.is_empty() {
        errors.push(ValidationError::new("email", "Email is required"));
    }
    if payload.password.is_empty() {
        errors.push(ValidationError::new("password", "Password is required"));
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    info!("🔐 Login attempt: {}", email);

    let store = state.user_store.clone();
    let password = payload.password;
    let lookup_email = email.clone();
    let user: Option<User> =
        tokio::task::spawn_blocking(move || store.authenticate(&lookup_email, &password))
            .await
            .map_err(|e| ApiError::internal("Failed to verify credentials", e))?
            .map_err(|e| ApiError::internal("Failed to verify credentials", e))?;

    let Some(user) = user else {
        warn!("❌ Failed login attempt: {}", email);
        return Err(ApiError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    };

    let token = state
        .issuer
        .issue(&user.id.to_string(), user.role.as_str(), Utc::now())
        .map_err(|e| ApiError::internal("Failed to generate token", e))?;

    info!("✅ Login successful: {} ({})", user.email, user.role);

    Ok(SuccessResponse::with_data(
        "Login successful",
        LoginResponse {
            token,
            user_id: user.id,
            role: user.role,
            expires_in: state.issuer.ttl().num_seconds(),
        },
    ))
}

/// Current identity - GET /api/v1/users/me
/// Built from the validated claims; no database lookup.
pub async fn me(claims: SessionClaims) -> Json<SuccessResponse<SessionClaims>> {
    SuccessResponse::with_data("Authenticated", claims)
}
