//! Storefront Backend Library
//!
//! Admission control, signed-session authentication and role gating in front
//! of a small product/order API. Exposed as a library so the binary and the
//! integration tests build the same router.

pub mod auth;
pub mod config;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod shop;

pub use config::Config;
pub use routes::{build_router, AppServices};
