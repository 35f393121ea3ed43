//! Access token inspection
//!
//! Bearer tokens are JWTs whose payload the client can decode but not verify.
//! The embedded expiry is used only for refresh scheduling; authorization
//! decisions stay with the server. A token that cannot be decoded, or that
//! carries no `exp` claim, is treated as already expired (fails closed).

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    Malformed,
    #[error("token payload is not valid base64: {0}")]
    Base64(String),
    #[error("token payload is not valid JSON: {0}")]
    Json(String),
}

/// Claims the client cares about. The signature segment is ignored.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct TokenClaims {
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    pub sub: Option<String>,
}

/// Decode the payload segment of a JWT without verifying its signature.
///
/// # Errors
///
/// Returns an error if the token does not have three dot-separated segments
/// or the payload segment is not base64url-encoded JSON.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(TokenError::Malformed);
    }

    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| TokenError::Base64(e.to_string()))?;

    serde_json::from_slice(&payload_bytes).map_err(|e| TokenError::Json(e.to_string()))
}

/// Embedded expiry timestamp, if the token decodes and carries an `exp` claim.
#[must_use]
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let claims = decode_claims(token).ok()?;
    let exp = claims.exp?;
    Utc.timestamp_opt(exp, 0).single()
}

/// Whether the token is expired, with an optional early-expiry buffer.
///
/// Undecodable tokens and tokens without an expiry count as expired.
#[must_use]
pub fn is_expired(token: &str, buffer: Duration) -> bool {
    expires_at(token).is_none_or(|exp| Utc::now() >= exp - buffer)
}

/// Remaining lifetime of the token, floored at zero.
#[must_use]
pub fn time_until_expiry(token: &str) -> Duration {
    expires_at(token).map_or_else(Duration::zero, |exp| {
        (exp - Utc::now()).max(Duration::zero())
    })
}
