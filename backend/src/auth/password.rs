//! Password hashing and verification (bcrypt)

use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    #[error("Password task failed: {0}")]
    TaskFailed(String),
}

impl From<bcrypt::BcryptError> for PasswordError {
    fn from(e: bcrypt::BcryptError) -> Self {
        PasswordError::HashingFailed(e.to_string())
    }
}

/// bcrypt hasher with a decoy hash for unknown users
///
/// `hash` and `verify` are CPU-bound; async callers go through
/// `hash_blocking` and `verify_blocking`.
#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    decoy_hash: String,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, PasswordError> {
        let decoy_hash = bcrypt::hash("decoy-password-never-matches", cost)?;
        Ok(Self { cost, decoy_hash })
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        Ok(bcrypt::hash(password, self.cost)?)
    }

    /// Verify `password` against `stored_hash`.
    ///
    /// With no stored hash the decoy is verified instead and the result is
    /// always `false`, so an unknown username costs the same as a wrong
    /// password.
    pub fn verify(&self, password: &str, stored_hash: Option<&str>) -> bool {
        match stored_hash {
            Some(hash) => bcrypt::verify(password, hash).unwrap_or(false),
            None => {
                let _ = bcrypt::verify(password, &self.decoy_hash);
                false
            }
        }
    }

    /// `hash` on the blocking thread pool
    pub async fn hash_blocking(self: &Arc<Self>, password: &str) -> Result<String, PasswordError> {
        let hasher = Arc::clone(self);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| PasswordError::TaskFailed(e.to_string()))?
    }

    /// `verify` on the blocking thread pool
    pub async fn verify_blocking(
        self: &Arc<Self>,
        password: &str,
        stored_hash: Option<String>,
    ) -> Result<bool, PasswordError> {
        let hasher = Arc::clone(self);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, stored_hash.as_deref()))
            .await
            .map_err(|e| PasswordError::TaskFailed(e.to_string()))
    }
}
