//! Bearer token verification
//!
//! Tokens are issued by the external identity service. Only verification
//! happens here: HS256 signature, expiry, and optional issuer/audience.

use async_trait::async_trait;
use coach_common::api::auth::ApiAuthError;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::IdentityConfig;

/// Identity-service user proven by a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Identity-service user id (`sub` claim)
    pub auth_id: String,
}

/// Token claims read by the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, ApiAuthError>;
}

/// HS256 JWT verifier
pub struct JwtIdentityProvider {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    pub fn new(config: &IdentityConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, ApiAuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| ApiAuthError::InvalidToken(e.to_string()))?;

        if data.claims.sub.is_empty() {
            return Err(ApiAuthError::InvalidToken("empty subject".into()));
        }

        Ok(VerifiedIdentity {
            auth_id: data.claims.sub,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "identity-test-secret";

    fn config() -> IdentityConfig {
        IdentityConfig {
            jwt_secret: SECRET.into(),
            issuer: None,
            audience: None,
        }
    }

    fn token(secret: &str, sub: &str, exp_offset: i64, aud: Option<&str>) -> String {
        let claims = Claims {
            sub: sub.into(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as u64,
            iss: None,
            aud: aud.map(str::to_string),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token() {
        let provider = JwtIdentityProvider::new(&config());
        let identity = provider
            .verify(&token(SECRET, "auth-1", 3600, Some("authenticated")))
            .await
            .unwrap();
        assert_eq!(identity.auth_id, "auth-1");
    }

    #[tokio::test]
    async fn test_wrong_signature_rejected() {
        let provider = JwtIdentityProvider::new(&config());
        let err = provider
            .verify(&token("other-secret", "auth-1", 3600, None))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiAuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let provider = JwtIdentityProvider::new(&config());
        assert!(provider.verify(&token(SECRET, "auth-1", -3600, None)).await.is_err());
    }

    #[tokio::test]
    async fn test_audience_enforced_when_configured() {
        let mut cfg = config();
        cfg.audience = Some("authenticated".into());
        let provider = JwtIdentityProvider::new(&cfg);

        assert!(provider
            .verify(&token(SECRET, "auth-1", 3600, Some("authenticated")))
            .await
            .is_ok());
        assert!(provider
            .verify(&token(SECRET, "auth-1", 3600, Some("anon")))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_garbage_rejected() {
        let provider = JwtIdentityProvider::new(&config());
        assert!(provider.verify("not-a-jwt").await.is_err());
    }
}
