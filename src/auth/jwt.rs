//! JWT Token Handler
//! Mission: Mint and verify signed, time-bounded session credentials
//!
//! Credentials are HS256 JWTs carrying `sub`, `role`, `iat` and `exp`. The
//! issuer and validator share one [`SigningSecret`] that is loaded at startup
//! and never changes afterwards.

use crate::auth::models::SessionClaims;
use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Default credential lifetime in hours
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;
const SIGNING_ALGORITHM_NAME: &str = "HS256";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("signing secret is not set or is empty")]
pub struct MissingSecret;

/// Process-wide HMAC key.
///
/// Construction fails on an empty key, which is how a missing `JWT_SECRET`
/// stops the process at startup. `Debug` output is redacted.
#[derive(Clone)]
pub struct SigningSecret(Arc<[u8]>);

impl SigningSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, MissingSecret> {
        let bytes = secret.into();
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(MissingSecret);
        }
        Ok(Self(bytes.into()))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Lifetime and clock tolerance for credentials.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub ttl: Duration,
    /// Allowed disagreement between issuer and validator clocks.
    pub clock_skew: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
            clock_skew: Duration::zero(),
        }
    }
}

/// Reasons a presented credential is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("no credential presented")]
    MissingCredential,
    #[error("credential is not a well-formed signed token")]
    MalformedCredential,
    #[error("credential signature does not verify")]
    InvalidSignature,
    #[error("credential is outside its validity window")]
    Expired,
}

#[derive(Serialize)]
struct WireClaims<'a> {
    sub: &'a str,
    role: &'a str,
    iat: i64,
    exp: i64,
}

/// Mints credentials on login.
pub struct CredentialIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl CredentialIssuer {
    pub fn new(secret: &SigningSecret, config: &TokenConfig) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            ttl: config.ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a credential for `subject` with `role`, valid from `now` for the
    /// configured TTL. Role vocabulary is the caller's concern.
    pub fn issue(&self, subject: &str, role: &str, now: DateTime<Utc>) -> Result<String> {
        if subject.trim().is_empty() {
            bail!("credential subject must not be empty");
        }
        if role.trim().is_empty() {
            bail!("credential role must not be empty");
        }

        let expires_at = now
            .checked_add_signed(self.ttl)
            .context("Invalid timestamp")?;

        let claims = WireClaims {
            sub: subject,
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        debug!(
            subject,
            role,
            ttl_hours = self.ttl.num_hours(),
            "Issuing credential"
        );

        encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.key)
            .context("Failed to sign credential")
    }
}

/// Verifies presented credentials and extracts [`SessionClaims`].
pub struct CredentialValidator {
    key: DecodingKey,
    validation: Validation,
    clock_skew: Duration,
}

impl CredentialValidator {
    pub fn new(secret: &SigningSecret, config: &TokenConfig) -> Self {
        // Only the signature is checked by the library. Time and claim checks
        // run against the caller's clock in `validate`.
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            clock_skew: config.clock_skew,
        }
    }

    /// Check `credential` at time `now`.
    ///
    /// Steps run in order and the first failure wins: presence, structure
    /// (three segments, decodable header and payload), signature (including
    /// the header algorithm), validity window, then claim completeness.
    pub fn validate(
        &self,
        credential: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionClaims, VerificationError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(VerificationError::MissingCredential);
        }

        let segments: Vec<&str> = credential.split('.').collect();
        let [header, payload, _signature] = segments[..] else {
            return Err(VerificationError::MalformedCredential);
        };

        // Structure is settled before any signature work: both JSON segments
        // must decode, and the header must name an algorithm.
        let header = decode_segment(header)?;
        decode_segment(payload)?;
        let algorithm = header
            .get("alg")
            .and_then(Value::as_str)
            .ok_or(VerificationError::MalformedCredential)?;
        if algorithm != SIGNING_ALGORITHM_NAME {
            return Err(VerificationError::InvalidSignature);
        }

        let claims = decode::<Map<String, Value>>(credential, &self.key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    VerificationError::InvalidSignature
                }
                _ => VerificationError::MalformedCredential,
            })?
            .claims;

        let issued_at = timestamp_claim(&claims, "iat")?;
        let expires_at = timestamp_claim(&claims, "exp")?;

        // A window that cannot be represented is treated as closed.
        let skew = self.clock_skew;
        let latest = expires_at
            .checked_add_signed(skew)
            .ok_or(VerificationError::Expired)?;
        let horizon = now
            .checked_add_signed(skew)
            .ok_or(VerificationError::Expired)?;
        if now > latest || issued_at > horizon {
            return Err(VerificationError::Expired);
        }

        let subject = string_claim(&claims, "sub")?;
        let role = string_claim(&claims, "role")?;

        Ok(SessionClaims {
            subject,
            role,
            issued_at,
            expires_at,
        })
    }
}

/// Base64url (unpadded) segment holding a JSON object.
fn decode_segment(segment: &str) -> Result<Map<String, Value>, VerificationError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| VerificationError::MalformedCredential)?;
    serde_json::from_slice(&bytes).map_err(|_| VerificationError::MalformedCredential)
}

fn timestamp_claim(
    claims: &Map<String, Value>,
    name: &str,
) -> Result<DateTime<Utc>, VerificationError> {
    claims
        .get(name)
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or(VerificationError::MalformedCredential)
}

fn string_claim(claims: &Map<String, Value>, name: &str) -> Result<String, VerificationError> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .ok_or(VerificationError::MalformedCredential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const SECRET: &str = "test-secret-key-12345";

    fn secret() -> SigningSecret {
        SigningSecret::new(SECRET).unwrap()
    }

    fn pair() -> (CredentialIssuer, CredentialValidator) {
        let config = TokenConfig::default();
        (
            CredentialIssuer::new(&secret(), &config),
            CredentialValidator::new(&secret(), &config),
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn sign_raw(claims: Value, algorithm: Algorithm, key: &str) -> String {
        encode(
            &Header::new(algorithm),
            &claims,
            &EncodingKey::from_secret(key.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        assert_eq!(SigningSecret::new("").unwrap_err(), MissingSecret);
        assert_eq!(SigningSecret::new("   ").unwrap_err(), MissingSecret);
        assert!(SigningSecret::new("x").is_ok());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let rendered = format!("{:?}", secret());
        assert!(!rendered.contains(SECRET));
    }

    #[test]
    fn test_issue_then_validate_round_trip() {
        let (issuer, validator) = pair();
        let token = issuer.issue("u1", "admin", t0()).unwrap();

        let claims = validator
            .validate(&token, t0() + Duration::hours(1))
            .unwrap();
        assert_eq!(claims.subject, "u1");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.issued_at, t0());
        assert_eq!(claims.expires_at, t0() + Duration::hours(24));
    }

    #[test]
    fn test_issue_requires_subject_and_role() {
        let (issuer, _) = pair();
        assert!(issuer.issue("", "user", t0()).is_err());
        assert!(issuer.issue("u1", "", t0()).is_err());
        assert!(issuer.issue("u1", "  ", t0()).is_err());
    }

    #[test]
    fn test_empty_credential_is_missing() {
        let (_, validator) = pair();
        assert_eq!(
            validator.validate("", t0()),
            Err(VerificationError::MissingCredential)
        );
        assert_eq!(
            validator.validate("   ", t0()),
            Err(VerificationError::MissingCredential)
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let (_, validator) = pair();
        for garbage in ["invalid", "invalid.token", "invalid.token.here", "a.b.c.d"] {
            assert_eq!(
                validator.validate(garbage, t0()),
                Err(VerificationError::MalformedCredential),
                "{}",
                garbage
            );
        }
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let (issuer, validator) = pair();
        let token = issuer.issue("u1", "user", t0()).unwrap();

        let sig_start = token.rfind('.').unwrap() + 1;
        let signature_len = token.len() - sig_start;
        for offset in 0..signature_len {
            let mut bytes = token.clone().into_bytes();
            let idx = sig_start + offset;
            bytes[idx] = if bytes[idx] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();

            assert_eq!(
                validator.validate(&tampered, t0()),
                Err(VerificationError::InvalidSignature),
                "offset {}",
                offset
            );
        }
    }

    #[test]
    fn test_tampered_claims_fail_signature() {
        let (issuer, validator) = pair();
        let token = issuer.issue("u1", "user", t0()).unwrap();
        let forged = issuer.issue("u1", "admin", t0()).unwrap();

        // Splice the admin payload onto the user signature.
        let parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);

        assert_eq!(
            validator.validate(&spliced, t0()),
            Err(VerificationError::InvalidSignature)
        );
    }

    #[test]
    fn test_different_secrets_reject() {
        let config = TokenConfig::default();
        let issuer = CredentialIssuer::new(&SigningSecret::new("secret1").unwrap(), &config);
        let validator = CredentialValidator::new(&SigningSecret::new("secret2").unwrap(), &config);

        let token = issuer.issue("u1", "user", t0()).unwrap();
        assert_eq!(
            validator.validate(&token, t0()),
            Err(VerificationError::InvalidSignature)
        );
    }

    #[test]
    fn test_other_algorithm_is_rejected() {
        let (_, validator) = pair();
        let token = sign_raw(
            json!({"sub": "u1", "role": "admin", "iat": t0().timestamp(), "exp": t0().timestamp() + 60}),
            Algorithm::HS512,
            SECRET,
        );

        assert_eq!(
            validator.validate(&token, t0()),
            Err(VerificationError::InvalidSignature)
        );
    }

    fn segment(value: Value) -> String {
        URL_SAFE_NO_PAD.encode(value.to_string())
    }

    #[test]
    fn test_undecodable_payload_is_malformed_not_forged() {
        let (_, validator) = pair();
        let header = segment(json!({"alg": "HS256", "typ": "JWT"}));

        let bad_base64 = format!("{}.!!!notbase64!!!.abc", header);
        assert_eq!(
            validator.validate(&bad_base64, t0()),
            Err(VerificationError::MalformedCredential)
        );

        let not_an_object = format!("{}.{}.abc", header, segment(json!([1, 2])));
        assert_eq!(
            validator.validate(&not_an_object, t0()),
            Err(VerificationError::MalformedCredential)
        );
    }

    #[test]
    fn test_header_without_algorithm_is_malformed() {
        let (_, validator) = pair();
        let token = format!(
            "{}.{}.abc",
            segment(json!({"typ": "JWT"})),
            segment(json!({"sub": "u1", "role": "user"}))
        );

        assert_eq!(
            validator.validate(&token, t0()),
            Err(VerificationError::MalformedCredential)
        );
    }

    #[test]
    fn test_unsigned_token_is_rejected_as_bad_signature() {
        let (_, validator) = pair();
        let iat = t0().timestamp();
        let token = format!(
            "{}.{}.",
            segment(json!({"alg": "none", "typ": "JWT"})),
            segment(json!({"sub": "u1", "role": "admin", "iat": iat, "exp": iat + 60}))
        );

        assert_eq!(
            validator.validate(&token, t0()),
            Err(VerificationError::InvalidSignature)
        );
    }

    #[test]
    fn test_oversized_skew_does_not_overflow() {
        let config = TokenConfig {
            ttl: Duration::hours(1),
            clock_skew: Duration::seconds(9_000_000_000_000),
        };
        let issuer = CredentialIssuer::new(&secret(), &config);
        let validator = CredentialValidator::new(&secret(), &config);
        let token = issuer.issue("u1", "user", t0()).unwrap();

        assert_eq!(
            validator.validate(&token, t0()),
            Err(VerificationError::Expired)
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let (issuer, validator) = pair();
        let token = issuer.issue("u1", "user", t0()).unwrap();
        let ttl = Duration::hours(DEFAULT_TOKEN_TTL_HOURS);

        assert!(validator.validate(&token, t0() + ttl).is_ok());
        assert_eq!(
            validator.validate(&token, t0() + ttl + Duration::seconds(1)),
            Err(VerificationError::Expired)
        );
    }

    #[test]
    fn test_future_issued_at_is_rejected_without_skew() {
        let (issuer, validator) = pair();
        let token = issuer.issue("u1", "user", t0()).unwrap();

        assert_eq!(
            validator.validate(&token, t0() - Duration::seconds(1)),
            Err(VerificationError::Expired)
        );
    }

    #[test]
    fn test_clock_skew_tolerance() {
        let config = TokenConfig {
            ttl: Duration::hours(1),
            clock_skew: Duration::seconds(30),
        };
        let issuer = CredentialIssuer::new(&secret(), &config);
        let validator = CredentialValidator::new(&secret(), &config);
        let token = issuer.issue("u1", "user", t0()).unwrap();

        assert!(validator.validate(&token, t0() - Duration::seconds(30)).is_ok());
        assert!(validator
            .validate(&token, t0() + Duration::hours(1) + Duration::seconds(30))
            .is_ok());
        assert_eq!(
            validator.validate(&token, t0() + Duration::hours(1) + Duration::seconds(31)),
            Err(VerificationError::Expired)
        );
    }

    #[test]
    fn test_missing_claims_are_malformed() {
        let (_, validator) = pair();
        let iat = t0().timestamp();

        let no_role = sign_raw(
            json!({"sub": "u1", "iat": iat, "exp": iat + 60}),
            Algorithm::HS256,
            SECRET,
        );
        let numeric_sub = sign_raw(
            json!({"sub": 7, "role": "user", "iat": iat, "exp": iat + 60}),
            Algorithm::HS256,
            SECRET,
        );
        let empty_sub = sign_raw(
            json!({"sub": "", "role": "user", "iat": iat, "exp": iat + 60}),
            Algorithm::HS256,
            SECRET,
        );
        let no_exp = sign_raw(
            json!({"sub": "u1", "role": "user", "iat": iat}),
            Algorithm::HS256,
            SECRET,
        );

        for token in [no_role, numeric_sub, empty_sub, no_exp] {
            assert_eq!(
                validator.validate(&token, t0()),
                Err(VerificationError::MalformedCredential)
            );
        }
    }

    #[test]
    fn test_expiry_is_checked_before_claim_completeness() {
        let (_, validator) = pair();
        let iat = t0().timestamp();
        let token = sign_raw(
            json!({"sub": "u1", "iat": iat, "exp": iat + 60}),
            Algorithm::HS256,
            SECRET,
        );

        assert_eq!(
            validator.validate(&token, t0() + Duration::hours(1)),
            Err(VerificationError::Expired)
        );
    }

    #[test]
    fn test_signature_is_checked_before_expiry() {
        let config = TokenConfig::default();
        let issuer = CredentialIssuer::new(&SigningSecret::new("other").unwrap(), &config);
        let (_, validator) = pair();
        let token = issuer.issue("u1", "user", t0()).unwrap();

        assert_eq!(
            validator.validate(&token, t0() + Duration::days(30)),
            Err(VerificationError::InvalidSignature)
        );
    }
}
