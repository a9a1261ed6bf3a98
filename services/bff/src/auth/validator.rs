//! Bearer-token validation against the cached signing-key set.
//!
//! # Purpose
//! Turns an opaque `Authorization` credential into a verified subject and
//! scope list, or into one of a closed set of failure kinds. The failure
//! kinds are part of the public contract: the interceptor categorizes them
//! for logs and metrics by matching the enum, never by matching strings.
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use super::jwks::{KeySetCache, KeySetError};

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Expected `iss` claim, compared by exact string equality.
    pub issuer: String,
    /// Entry that must be present in the `aud` claim.
    pub audience: String,
    /// Tolerance applied to `exp`/`nbf` checks.
    pub clock_skew: Duration,
}

/// Claims extracted from a successfully verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedClaims {
    pub subject: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
}

impl ValidatedClaims {
    /// Scopes joined back into the wire form.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Closed set of validation failures. Variants identify the kind
/// structurally; the payload strings are for logs only.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("invalid algorithm: {0} (only RS256 is allowed)")]
    InvalidAlgorithm(String),
    #[error("token not yet valid")]
    NotYetValid,
    #[error("malformed token")]
    Malformed,
}

impl AuthError {
    /// Stable reason label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Expired => "token_expired",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::InvalidSignature(_) => "invalid_signature",
            AuthError::InvalidAlgorithm(_) => "invalid_algorithm",
            AuthError::NotYetValid => "token_not_yet_valid",
            AuthError::Malformed => "malformed_token",
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, AuthError::Expired)
    }
}

pub struct TokenValidator {
    config: ValidatorConfig,
    keys: Arc<KeySetCache>,
}

/// Unverified JWT header fields needed to resolve the signing key.
#[derive(Debug, Deserialize)]
struct RawHeader {
    alg: Option<String>,
    kid: Option<String>,
}

/// Claims we extract beyond what the library validates.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    scope: Option<String>,
    exp: i64,
    iat: Option<i64>,
}

impl TokenValidator {
    pub fn new(config: ValidatorConfig, keys: Arc<KeySetCache>) -> Self {
        Self { config, keys }
    }

    /// Verify a compact-form JWT and extract its claims.
    pub async fn validate(&self, token: &str) -> Result<ValidatedClaims, AuthError> {
        let header = parse_header(token)?;

        match header.alg.as_deref() {
            Some("RS256") => {}
            Some(other) => return Err(AuthError::InvalidAlgorithm(other.to_string())),
            None => return Err(AuthError::InvalidAlgorithm("none".to_string())),
        }

        let kid = match header.kid.as_deref() {
            Some(kid) if !kid.is_empty() => kid,
            _ => {
                return Err(AuthError::InvalidSignature(
                    "missing kid in token header".to_string(),
                ));
            }
        };

        let jwk = match self.keys.get(kid).await {
            Ok(jwk) => jwk,
            Err(KeySetError::KeyNotFound(kid)) => {
                return Err(AuthError::InvalidSignature(format!("key not found: {kid}")));
            }
            Err(KeySetError::Fetch(_)) => {
                return Err(AuthError::InvalidSignature("key set unavailable".to_string()));
            }
        };
        let decoding_key = DecodingKey::from_jwk(&jwk)
            .map_err(|_| AuthError::InvalidSignature("unusable key material".to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.leeway = self.config.clock_skew.as_secs();
        validation.validate_nbf = true;

        let data =
            decode::<RawClaims>(token, &decoding_key, &validation).map_err(map_jwt_error)?;

        let subject = match data.claims.sub {
            Some(sub) if !sub.is_empty() => sub,
            _ => return Err(AuthError::Malformed),
        };

        Ok(ValidatedClaims {
            subject,
            scopes: split_scopes(data.claims.scope.as_deref()),
            expires_at: timestamp(data.claims.exp),
            issued_at: data.claims.iat.map(timestamp),
        })
    }
}

fn parse_header(token: &str) -> Result<RawHeader, AuthError> {
    let mut parts = token.split('.');
    let header = parts.next().ok_or(AuthError::Malformed)?;
    // Compact form is exactly three segments.
    if parts.clone().count() != 2 {
        return Err(AuthError::Malformed);
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| AuthError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed)
}

/// `scope` is a single space-separated string; absent or empty yields no scopes.
fn split_scopes(scope: Option<&str>) -> Vec<String> {
    scope
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::ImmatureSignature => AuthError::NotYetValid,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            AuthError::InvalidAlgorithm("header/key mismatch".to_string())
        }
        ErrorKind::InvalidSignature => {
            AuthError::InvalidSignature("signature mismatch".to_string())
        }
        ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::InvalidToken
        | ErrorKind::MissingRequiredClaim(_) => AuthError::Malformed,
        _ => AuthError::InvalidSignature(err.to_string()),
    }
}
