//! Credential checks for evaluation endpoints
//!
//! Two credential kinds reach the service:
//! - A shared secret in the `x-scorer-secret` header, sent by the external scorer
//! - An end-user bearer token in `Authorization`, issued by the identity service
//!
//! This module contains ONLY pure functions. HTTP extraction lives in the
//! service crate.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Header carrying the scorer shared secret
pub const SCORER_SECRET_HEADER: &str = "x-scorer-secret";

/// Authentication error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiAuthError {
    /// No credential supplied
    #[error("Missing credential")]
    MissingCredential,

    /// Authorization header is not `Bearer <token>`
    #[error("Malformed authorization header")]
    MalformedHeader,

    /// Shared secret does not match
    #[error("Invalid shared secret")]
    InvalidSecret,

    /// Token rejected by the identity provider
    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),
}

/// Shared secret held as a SHA-256 digest
///
/// Comparison runs over fixed-length digests so timing does not depend on
/// where the first mismatching byte is.
#[derive(Clone)]
pub struct SharedSecret {
    digest: [u8; 32],
}

impl SharedSecret {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: digest(secret),
        }
    }

    /// Check a header value against the configured secret
    pub fn verify(&self, provided: Option<&str>) -> Result<(), ApiAuthError> {
        let provided = match provided {
            Some(value) if !value.is_empty() => value,
            _ => return Err(ApiAuthError::MissingCredential),
        };

        let candidate = digest(provided);
        let diff = self
            .digest
            .iter()
            .zip(candidate.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));

        if diff == 0 {
            Ok(())
        } else {
            Err(ApiAuthError::InvalidSecret)
        }
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(***)")
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn parse_bearer(header: Option<&str>) -> Result<&str, ApiAuthError> {
    let header = header.ok_or(ApiAuthError::MissingCredential)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(ApiAuthError::MalformedHeader)?
        .trim();

    if token.is_empty() {
        return Err(ApiAuthError::MalformedHeader);
    }
    Ok(token)
}
