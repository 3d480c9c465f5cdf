//! Bearer credential verification.
//!
//! Tokens are issued by the portal's login handler. The relay only verifies
//! them; it never mints tokens.

use crate::config::JwtKey;
use crate::error::AppError;
use crate::models::{flexible_id_opt, UserId};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

/// Verified identity extracted from a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claims {
    pub user_id: UserId,
}

/// Identity claim accepted under `sub`, `id` or `userId`
#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default, deserialize_with = "flexible_id_opt")]
    sub: Option<UserId>,
    #[serde(default, deserialize_with = "flexible_id_opt")]
    id: Option<UserId>,
    #[serde(default, rename = "userId", deserialize_with = "flexible_id_opt")]
    user_id: Option<UserId>,
}

#[async_trait::async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Claims, AppError>;
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn from_key(key: &JwtKey) -> Result<Self, AppError> {
        let (key, algorithm) = match key {
            JwtKey::Secret(secret) => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
            JwtKey::RsaPublicPem(pem) => (
                DecodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| AppError::Config(format!("invalid RSA public key: {e}")))?,
                Algorithm::RS256,
            ),
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = 30;

        Ok(Self { key, validation })
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, AppError> {
        let data = decode::<RawClaims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            AppError::Unauthorized
        })?;

        let raw = data.claims;
        let user_id = raw
            .sub
            .or(raw.id)
            .or(raw.user_id)
            .ok_or(AppError::Unauthorized)?;

        Ok(Claims { user_id })
    }
}

#[async_trait::async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AppError> {
        self.decode_claims(token)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
