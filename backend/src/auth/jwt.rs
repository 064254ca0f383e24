//! Access token issuing and verification
//!
//! Access tokens are HS256 JWTs carrying the username, role and a fixed
//! expiry. Verification is pure: signature and expiry only, no I/O.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Principal;

/// Minimum HMAC key length (256 bits)
pub const MIN_SECRET_BYTES: usize = 32;

/// JWT-related errors
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Signing secret must be at least {MIN_SECRET_BYTES} bytes")]
    WeakSecret,

    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Token decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Token expired")]
    TokenExpired,
}

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Numeric user id
    pub uid: i64,
    /// User role
    pub role: String,
    /// Display name at issue time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// JWT ID
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.uid,
            username: self.sub.clone(),
            display_name: self.name.clone(),
            role: self.role.clone(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A signed access token with the claims it carries
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub claims: Claims,
}

/// Stateless access token issuer
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer from a symmetric secret of at least 256 bits
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, JwtError> {
        if secret.as_bytes().len() < MIN_SECRET_BYTES {
            return Err(JwtError::WeakSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        })
    }

    /// Sign an access token for `principal`, valid for the configured TTL
    pub fn issue_access_token(&self, principal: &Principal) -> Result<SignedToken, JwtError> {
        let now = Utc::now();
        let exp = now + self.ttl;

        let claims = Claims {
            sub: principal.username.clone(),
            uid: principal.user_id,
            role: principal.role.clone(),
            name: principal.display_name.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingFailed(e.to_string()))?;

        Ok(SignedToken { token, claims })
    }

    /// Check signature and expiry
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let token_data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                    _ => JwtError::DecodingFailed(e.to_string()),
                }
            })?;

        Ok(token_data.claims)
    }
}
