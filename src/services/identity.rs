//! Bearer token verification.
//!
//! Tokens are issued by an external identity provider; this service only
//! verifies them and exposes who the caller is.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::AuthConfig;

/// Verified caller identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub name: Option<String>,
    /// Non-registered claims carried by the token (e.g. `role`).
    pub custom_claims: Map<String, Value>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid verification key: {0}")]
    InvalidKey(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

const REGISTERED: [&str; 7] = ["iss", "aud", "exp", "iat", "nbf", "jti", "auth_time"];

/// JWT verification against a shared HS256 secret or an RS256 public key.
pub struct JwtIdentityProvider {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    pub fn hs256(secret: &str) -> Self {
        Self::new(DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
    }

    pub fn rs256_pem(pem: &str) -> Result<Self, IdentityError> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        Ok(Self::new(key, Algorithm::RS256))
    }

    fn new(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_aud = false;
        Self { key, validation }
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.validation.validate_aud = true;
        self
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, IdentityError> {
        let provider = match (&config.jwt_public_key_pem, &config.jwt_secret) {
            (Some(pem), _) => Self::rs256_pem(pem)?,
            (None, Some(secret)) => Self::hs256(secret),
            (None, None) => return Err(IdentityError::InvalidKey("no verification key configured".to_string())),
        };
        let provider = match &config.issuer {
            Some(issuer) => provider.with_issuer(issuer),
            None => provider,
        };
        Ok(match &config.audience {
            Some(audience) => provider.with_audience(audience),
            None => provider,
        })
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;
        let Claims { sub, email, name, mut extra } = data.claims;
        for claim in REGISTERED {
            extra.remove(claim);
        }
        Ok(Identity { uid: sub, email: email.unwrap_or_default(), name, custom_claims: extra })
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};

    pub const SECRET: &str = "test-secret";

    /// HS256 token for `uid` with optional extra claims.
    pub fn token(uid: &str, email: &str, extra: Value) -> String {
        let mut claims = json!({
            "sub": uid,
            "email": email,
            "exp": (Utc::now() + Duration::hours(1)).timestamp(),
            "iat": Utc::now().timestamp(),
        });
        if let (Some(map), Value::Object(more)) = (claims.as_object_mut(), extra) {
            map.extend(more);
        }
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }
}
