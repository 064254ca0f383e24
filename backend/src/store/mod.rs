//! Persistence seam for the registry
//!
//! Every logical operation opens one `StoreTx`, performs its reads and writes
//! through the repository traits, and commits. Dropping an uncommitted
//! transaction rolls it back, so an error or timeout leaves no partial state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::lineage::SacramentKind;
use crate::models::{
    NewRefreshToken, NewSacrament, NewUser, RefreshToken, SacramentRecord, User,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation(
                    db_err.constraint().unwrap_or("unknown").to_string(),
                );
            }
        }
        StoreError::Database(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Credential store
#[async_trait]
pub trait UserRepo {
    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_id(&mut self, id: i64) -> StoreResult<Option<User>>;

    /// Fails with `UniqueViolation` when the username is taken.
    async fn insert_user(&mut self, user: NewUser) -> StoreResult<User>;
}

/// Refresh ledger
#[async_trait]
pub trait RefreshTokenRepo {
    /// Looks up a token by digest and locks it for the rest of the transaction.
    async fn find_refresh_token_for_update(
        &mut self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshToken>>;

    async fn insert_refresh_token(&mut self, token: NewRefreshToken) -> StoreResult<RefreshToken>;

    /// Returns the number of rows removed (0 or 1).
    async fn delete_refresh_token(&mut self, token_hash: &str) -> StoreResult<u64>;

    async fn delete_refresh_tokens_for_user(&mut self, user_id: i64) -> StoreResult<u64>;

    async fn delete_refresh_tokens_expired_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64>;
}

/// Stage repositories, one table per kind
#[async_trait]
pub trait SacramentRepo {
    async fn find_sacrament(
        &mut self,
        kind: SacramentKind,
        id: i64,
    ) -> StoreResult<Option<SacramentRecord>>;

    /// Like `find_sacrament`, but locks the row so successor creation
    /// against it is serialised.
    async fn lock_sacrament(
        &mut self,
        kind: SacramentKind,
        id: i64,
    ) -> StoreResult<Option<SacramentRecord>>;

    /// The record of `kind` created against `predecessor_id`, if any.
    async fn find_successor(
        &mut self,
        kind: SacramentKind,
        predecessor_id: i64,
    ) -> StoreResult<Option<SacramentRecord>>;

    /// Fails with `UniqueViolation` when a record of the same kind already
    /// references the same predecessor.
    async fn insert_sacrament(&mut self, record: NewSacrament) -> StoreResult<SacramentRecord>;
}

/// One open unit of work
#[async_trait]
pub trait StoreTx: UserRepo + RefreshTokenRepo + SacramentRepo + Send {
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Transaction factory shared by all services
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    async fn health_check(&self) -> StoreResult<()>;
}
