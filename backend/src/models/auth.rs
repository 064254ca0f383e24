//! Authentication models for the church registry

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use validator::Validate;

use super::Principal;

/// Outstanding refresh token. Only the SHA-256 digest of the value is persisted.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Refresh token row to insert
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: i64,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful login or rotation
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub principal: Principal,
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Username/password login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 255))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Refresh token request (also used by logout)
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

/// Auth tokens response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokensResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub role: String,
}

impl From<SessionTokens> for AuthTokensResponse {
    fn from(tokens: SessionTokens) -> Self {
        let expires_in = (tokens.access_expires_at - Utc::now()).num_seconds().max(0);
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
            username: tokens.principal.username,
            display_name: tokens.principal.display_name,
            role: tokens.principal.role,
        }
    }
}

/// Response for logout-all
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutAllResponse {
    pub revoked_sessions: u64,
}
