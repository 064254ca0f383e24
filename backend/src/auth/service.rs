//! Session management
//!
//! Password login, refresh token rotation and logout. Each write runs in a
//! single store transaction; a refresh token value is consumed by deleting
//! its ledger row, so at most one caller can ever rotate a given value.
//! Password hashing never runs while a transaction is open.

use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

use crate::models::{NewRefreshToken, NewUser, Principal, SessionTokens, User};
use crate::store::{RefreshTokenRepo, Store, StoreError, StoreTx, UserRepo};

use super::jwt::{JwtError, TokenIssuer};
use super::password::{PasswordError, PasswordHasher};

/// Auth service errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown user or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Username already exists")]
    UsernameTaken,

    #[error("Token error: {0}")]
    Token(#[from] JwtError),

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Session manager
pub struct SessionManager {
    store: Arc<dyn Store>,
    issuer: Arc<TokenIssuer>,
    passwords: Arc<PasswordHasher>,
    refresh_token_ttl: Duration,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn Store>,
        issuer: Arc<TokenIssuer>,
        passwords: PasswordHasher,
        refresh_token_ttl: Duration,
    ) -> Self {
        Self {
            store,
            issuer,
            passwords: Arc::new(passwords),
            refresh_token_ttl,
        }
    }

    pub fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    /// Check a username/password pair
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Principal, AuthError> {
        let user = self.verify_credentials(username, password).await?;
        Ok(Principal::from(&user))
    }

    /// Authenticate and open a new session
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionTokens, AuthError> {
        let user = self.verify_credentials(username, password).await?;

        let mut tx = self.store.begin().await?;
        let tokens = self.open_session(&mut tx, &user).await?;

        tx.commit().await?;

        tracing::info!(user_id = user.id, username = %user.username, "User logged in");
        Ok(tokens)
    }

    /// Rotate a refresh token: consume the presented value and issue a new pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, AuthError> {
        let token_hash = hash_token(refresh_token);
        let mut tx = self.store.begin().await?;

        let stored = tx
            .find_refresh_token_for_update(&token_hash)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if stored.is_expired_at(Utc::now()) {
            tx.delete_refresh_token(&token_hash).await?;
            tx.commit().await?;
            tracing::debug!(user_id = stored.user_id, "Expired refresh token presented");
            return Err(AuthError::RefreshTokenExpired);
        }

        // another rotation already consumed this value
        if tx.delete_refresh_token(&token_hash).await? == 0 {
            return Err(AuthError::InvalidRefreshToken);
        }

        let user = tx
            .find_user_by_id(stored.user_id)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        let tokens = self.open_session(&mut tx, &user).await?;

        tx.commit().await?;

        tracing::debug!(user_id = user.id, "Refresh token rotated");
        Ok(tokens)
    }

    /// Revoke one session. Unknown values are not an error.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let mut tx = self.store.begin().await?;
        let removed = tx.delete_refresh_token(&hash_token(refresh_token)).await?;
        tx.commit().await?;

        tracing::debug!(removed, "Logout");
        Ok(())
    }

    /// Revoke every session of `principal`
    pub async fn logout_all(&self, principal: &Principal) -> Result<u64, AuthError> {
        let mut tx = self.store.begin().await?;
        let removed = tx.delete_refresh_tokens_for_user(principal.user_id).await?;
        tx.commit().await?;

        tracing::info!(user_id = principal.user_id, removed, "All sessions revoked");
        Ok(removed)
    }

    /// Create a user with a freshly hashed password
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        display_name: Option<String>,
        role: &str,
    ) -> Result<User, AuthError> {
        let password_hash = self.passwords.hash_blocking(password).await?;

        let mut tx = self.store.begin().await?;
        let user = tx
            .insert_user(NewUser {
                username: username.to_string(),
                password_hash,
                display_name,
                role: role.to_string(),
            })
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => AuthError::UsernameTaken,
                other => AuthError::Storage(other),
            })?;
        tx.commit().await?;

        tracing::info!(
            user_id = user.id,
            username = %user.username,
            role = %user.role,
            "User created"
        );
        Ok(user)
    }

    /// Create the user unless the username already exists. Returns whether
    /// a user was created.
    pub async fn ensure_user(
        &self,
        username: &str,
        password: &str,
        display_name: Option<String>,
        role: &str,
    ) -> Result<bool, AuthError> {
        match self.create_user(username, password, display_name, role).await {
            Ok(_) => Ok(true),
            Err(AuthError::UsernameTaken) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Look the user up in a read-only transaction, then check the password
    /// after that transaction is released
    async fn verify_credentials(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let user = {
            let mut tx = self.store.begin().await?;
            tx.find_user_by_username(username).await?
        };

        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
        if !self.passwords.verify_blocking(password, stored_hash).await? {
            tracing::debug!("Authentication failed");
            return Err(AuthError::InvalidCredentials);
        }

        user.ok_or(AuthError::InvalidCredentials)
    }

    /// Mint and persist a refresh token for `user` and sign an access token
    async fn open_session(
        &self,
        tx: &mut Box<dyn StoreTx>,
        user: &User,
    ) -> Result<SessionTokens, AuthError> {
        let now = Utc::now();
        let refresh_token = generate_refresh_token_value();
        let refresh_expires_at = now + self.refresh_token_ttl;

        tx.insert_refresh_token(NewRefreshToken {
            user_id: user.id,
            token_hash: hash_token(&refresh_token),
            issued_at: now,
            expires_at: refresh_expires_at,
        })
        .await?;

        let principal = Principal::from(user);
        let access = self.issuer.issue_access_token(&principal)?;

        Ok(SessionTokens {
            access_token: access.token,
            access_expires_at: access.claims.expires_at(),
            refresh_token,
            refresh_expires_at,
            principal,
        })
    }
}

/// Generate an unguessable refresh token value (256 random bits, hex)
fn generate_refresh_token_value() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Hash a token for storage
pub(crate) fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
