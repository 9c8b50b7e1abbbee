//! Authentication Module
//! Mission: Signed-session credentials, role gating and user accounts

pub mod api;
pub mod gate;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod user_store;

pub use api::AuthState;
pub use gate::{authorize, require_role};
pub use jwt::{CredentialIssuer, CredentialValidator, SigningSecret, TokenConfig, VerificationError};
pub use middleware::auth_middleware;
pub use models::{Role, SessionClaims};
pub use user_store::UserStore;
