//! Server configuration from command-line flags and environment variables.

use crate::auth::jwt::{MissingSecret, SigningSecret, TokenConfig};
use crate::middleware::RateLimitConfig;
use anyhow::{bail, Context, Result};
use axum::http::{header, HeaderValue, Method};
use clap::{ArgAction, Parser};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::CorsLayer;

const CORS_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);
/// Ten years.
const MAX_TOKEN_TTL_HOURS: i64 = 10 * 365 * 24;
/// One day.
const MAX_CLOCK_SKEW_SECS: i64 = 24 * 60 * 60;

#[derive(Parser, Clone)]
#[command(name = "storefront")]
#[command(about = "Storefront API server with per-client admission control and signed sessions")]
pub struct Config {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3001")]
    pub port: u16,

    /// SQLite database file
    #[arg(long, env = "DB_PATH", default_value = "storefront.db")]
    pub db_path: String,

    /// HMAC key for session credentials. Startup fails without it.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Credential lifetime in hours
    #[arg(long, env = "TOKEN_TTL_HOURS", default_value = "24",
          value_parser = clap::value_parser!(i64).range(1..=MAX_TOKEN_TTL_HOURS))]
    pub token_ttl_hours: i64,

    /// Tolerated clock difference when checking credential times, in seconds
    #[arg(long, env = "TOKEN_CLOCK_SKEW_SECS", default_value = "0",
          value_parser = clap::value_parser!(i64).range(0..=MAX_CLOCK_SKEW_SECS))]
    pub token_clock_skew_secs: i64,

    /// Requests a client may burst before being throttled
    #[arg(long, env = "RATE_LIMIT_CAPACITY", default_value = "20",
          value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit_capacity: u32,

    /// Sustained requests per second per client
    #[arg(long, env = "RATE_LIMIT_REFILL_PER_SEC", default_value = "10")]
    pub rate_limit_refill_per_sec: f64,

    /// Seconds between idle-bucket sweeps
    #[arg(long, env = "RATE_LIMIT_SWEEP_SECS", default_value = "60",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub rate_limit_sweep_secs: u64,

    /// Seconds of inactivity before a client's bucket is evicted
    #[arg(long, env = "RATE_LIMIT_IDLE_SECS", default_value = "180")]
    pub rate_limit_idle_secs: u64,

    /// Key clients by the first X-Forwarded-For hop (only behind a trusted proxy)
    #[arg(long, env = "TRUST_PROXY_HEADERS", default_value = "false", action = ArgAction::Set)]
    pub trust_proxy_headers: bool,

    /// Allowed CORS origins (comma-separated, `*` for any)
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// Bootstrap admin account created at startup if missing
    #[arg(long, env = "ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Let `/users/register` create admin accounts
    #[arg(long, env = "ALLOW_ADMIN_SIGNUP", default_value = "false", action = ArgAction::Set)]
    pub allow_admin_signup: bool,
}

impl Config {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    pub fn signing_secret(&self) -> Result<SigningSecret, MissingSecret> {
        SigningSecret::new(self.jwt_secret.clone().unwrap_or_default())
    }

    pub fn token_config(&self) -> Result<TokenConfig> {
        let ttl = chrono::Duration::try_hours(self.token_ttl_hours)
            .with_context(|| format!("TOKEN_TTL_HOURS out of range: {}", self.token_ttl_hours))?;
        let clock_skew = chrono::Duration::try_seconds(self.token_clock_skew_secs).with_context(
            || format!("TOKEN_CLOCK_SKEW_SECS out of range: {}", self.token_clock_skew_secs),
        )?;

        Ok(TokenConfig { ttl, clock_skew })
    }

    pub fn rate_limit_config(&self) -> Result<RateLimitConfig> {
        let refill = self.rate_limit_refill_per_sec;
        if !refill.is_finite() || refill <= 0.0 {
            bail!("RATE_LIMIT_REFILL_PER_SEC must be a positive number, got {}", refill);
        }

        Ok(RateLimitConfig {
            capacity: self.rate_limit_capacity,
            refill_per_sec: refill,
            sweep_interval: Duration::from_secs(self.rate_limit_sweep_secs),
            idle_timeout: Duration::from_secs(self.rate_limit_idle_secs),
            trust_proxy_headers: self.trust_proxy_headers,
        })
    }

    /// Bootstrap admin credentials, when both are set.
    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        let email = self.admin_email.as_deref().map(str::trim).filter(|e| !e.is_empty())?;
        let password = self.admin_password.as_deref().filter(|p| !p.is_empty())?;
        Some((email, password))
    }

    pub fn cors_layer(&self) -> Result<CorsLayer> {
        let origins: Vec<&str> = self
            .cors_origins
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .collect();

        if origins.is_empty() || origins.contains(&"*") {
            return Ok(CorsLayer::permissive());
        }

        let origins = origins
            .into_iter()
            .map(|o| {
                HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin {}", o))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(CORS_MAX_AGE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["storefront"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--jwt-secret", "s3cret"]);
        assert_eq!(config.port, 3001);
        assert!(!config.trust_proxy_headers);
        assert!(!config.allow_admin_signup);

        let limits = config.rate_limit_config().unwrap();
        assert_eq!(limits.capacity, 20);
        assert_eq!(limits.refill_per_sec, 10.0);
        assert_eq!(limits.sweep_interval, Duration::from_secs(60));
        assert_eq!(limits.idle_timeout, Duration::from_secs(180));

        let tokens = config.token_config().unwrap();
        assert_eq!(tokens.ttl, chrono::Duration::hours(24));
        assert_eq!(tokens.clock_skew, chrono::Duration::zero());
    }

    #[test]
    fn test_missing_or_blank_secret_is_rejected() {
        assert_eq!(parse(&[]).signing_secret().unwrap_err(), MissingSecret);
        assert_eq!(
            parse(&["--jwt-secret", "   "]).signing_secret().unwrap_err(),
            MissingSecret
        );
        assert!(parse(&["--jwt-secret", "s3cret"]).signing_secret().is_ok());
    }

    #[test]
    fn test_limits_are_validated() {
        let argv = ["storefront", "--rate-limit-capacity", "0"];
        assert!(Config::try_parse_from(argv).is_err());

        let config = parse(&["--rate-limit-refill-per-sec", "0"]);
        assert!(config.rate_limit_config().is_err());
    }

    #[test]
    fn test_token_durations_are_bounded() {
        let too_long = ["storefront", "--token-ttl-hours", "9223372036854775807"];
        assert!(Config::try_parse_from(too_long).is_err());

        let too_loose = ["storefront", "--token-clock-skew-secs", "9000000000000"];
        assert!(Config::try_parse_from(too_loose).is_err());

        let widest = parse(&[
            "--token-ttl-hours",
            "87600",
            "--token-clock-skew-secs",
            "86400",
        ])
        .token_config()
        .unwrap();
        assert_eq!(widest.ttl, chrono::Duration::hours(87_600));
        assert_eq!(widest.clock_skew, chrono::Duration::seconds(86_400));
    }

    #[test]
    fn test_bool_flags_take_values() {
        let config = parse(&["--trust-proxy-headers", "true", "--allow-admin-signup", "true"]);
        assert!(config.trust_proxy_headers);
        assert!(config.allow_admin_signup);
        assert!(config.rate_limit_config().unwrap().trust_proxy_headers);
    }

    #[test]
    fn test_bootstrap_admin_needs_both_fields() {
        assert!(parse(&["--admin-email", "root@example.com"])
            .bootstrap_admin()
            .is_none());
        assert_eq!(
            parse(&["--admin-email", "root@example.com", "--admin-password", "changeme!"])
                .bootstrap_admin(),
            Some(("root@example.com", "changeme!"))
        );
    }

    #[test]
    fn test_cors_origins() {
        assert!(parse(&[]).cors_layer().is_ok());
        let config = parse(&["--cors-origins", "http://localhost:3000,https://shop.example.com"]);
        assert_eq!(config.cors_origins.len(), 2);
        assert!(config.cors_layer().is_ok());
    }
}
