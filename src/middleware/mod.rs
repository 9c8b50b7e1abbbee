//! Middleware for admission control and observability.
//!
//! This module provides:
//! - Per-client token bucket rate limiting
//! - Request logging with latency tracking
//! - The shared rejection type for the gate chain

pub mod logging;
pub mod rate_limit;
pub mod rejection;

pub use logging::request_logging;
pub use rate_limit::{rate_limit_middleware, AdmissionController, RateLimitConfig, SweeperHandle};
pub use rejection::GateRejection;
