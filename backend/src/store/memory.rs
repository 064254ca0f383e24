//! In-process store
//!
//! Transactions are serialisable: `begin` takes an owned lock on the whole
//! data set and works on a staged copy that replaces the shared state on
//! commit. The same uniqueness rules as the Postgres schema are enforced on
//! insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    RefreshTokenRepo, SacramentRepo, Store, StoreError, StoreResult, StoreTx, UserRepo,
};
use crate::lineage::SacramentKind;
use crate::models::{
    NewRefreshToken, NewSacrament, NewUser, RefreshToken, SacramentRecord, User,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    refresh_tokens: HashMap<String, RefreshToken>,
    sacraments: HashMap<SacramentKind, BTreeMap<i64, SacramentRecord>>,
    sequences: HashMap<&'static str, i64>,
}

impl Tables {
    fn next_id(&mut self, sequence: &'static str) -> i64 {
        let next = self.sequences.entry(sequence).or_insert(0);
        *next += 1;
        *next
    }
}

/// Store backed by process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[async_trait]
impl UserRepo for MemoryTx {
    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .staged
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_id(&mut self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.staged.users.get(&id).cloned())
    }

    async fn insert_user(&mut self, user: NewUser) -> StoreResult<User> {
        if self
            .staged
            .users
            .values()
            .any(|u| u.username == user.username)
        {
            return Err(StoreError::UniqueViolation(
                "app_users_username_key".to_string(),
            ));
        }

        let id = self.staged.next_id("app_users");
        let user = User {
            id,
            username: user.username,
            password_hash: user.password_hash,
            display_name: user.display_name,
            role: user.role,
            created_at: Utc::now(),
        };
        self.staged.users.insert(id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl RefreshTokenRepo for MemoryTx {
    async fn find_refresh_token_for_update(
        &mut self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshToken>> {
        Ok(self.staged.refresh_tokens.get(token_hash).cloned())
    }

    async fn insert_refresh_token(&mut self, token: NewRefreshToken) -> StoreResult<RefreshToken> {
        if self.staged.refresh_tokens.contains_key(&token.token_hash) {
            return Err(StoreError::UniqueViolation(
                "refresh_tokens_token_hash_key".to_string(),
            ));
        }
        if !self.staged.users.contains_key(&token.user_id) {
            return Err(StoreError::Database(format!(
                "refresh token references unknown user {}",
                token.user_id
            )));
        }

        let id = self.staged.next_id("refresh_tokens");
        let token = RefreshToken {
            id,
            user_id: token.user_id,
            token_hash: token.token_hash,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
        };
        self.staged
            .refresh_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(token)
    }

    async fn delete_refresh_token(&mut self, token_hash: &str) -> StoreResult<u64> {
        Ok(self.staged.refresh_tokens.remove(token_hash).map_or(0, |_| 1))
    }

    async fn delete_refresh_tokens_for_user(&mut self, user_id: i64) -> StoreResult<u64> {
        let before = self.staged.refresh_tokens.len();
        self.staged
            .refresh_tokens
            .retain(|_, token| token.user_id != user_id);
        Ok((before - self.staged.refresh_tokens.len()) as u64)
    }

    async fn delete_refresh_tokens_expired_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let before = self.staged.refresh_tokens.len();
        self.staged
            .refresh_tokens
            .retain(|_, token| !token.is_expired_at(cutoff));
        Ok((before - self.staged.refresh_tokens.len()) as u64)
    }
}

#[async_trait]
impl SacramentRepo for MemoryTx {
    async fn find_sacrament(
        &mut self,
        kind: SacramentKind,
        id: i64,
    ) -> StoreResult<Option<SacramentRecord>> {
        Ok(self
            .staged
            .sacraments
            .get(&kind)
            .and_then(|table| table.get(&id))
            .cloned())
    }

    async fn lock_sacrament(
        &mut self,
        kind: SacramentKind,
        id: i64,
    ) -> StoreResult<Option<SacramentRecord>> {
        // the whole data set is already held exclusively
        self.find_sacrament(kind, id).await
    }

    async fn find_successor(
        &mut self,
        kind: SacramentKind,
        predecessor_id: i64,
    ) -> StoreResult<Option<SacramentRecord>> {
        Ok(self.staged.sacraments.get(&kind).and_then(|table| {
            table
                .values()
                .find(|record| record.predecessor_id() == Some(predecessor_id))
                .cloned()
        }))
    }

    async fn insert_sacrament(&mut self, record: NewSacrament) -> StoreResult<SacramentRecord> {
        let kind = record.details.kind();
        let predecessor = kind.rule().predecessor;

        if let Some(predecessor) = predecessor {
            let predecessor_id = record.lineage.id_of(predecessor).ok_or_else(|| {
                StoreError::Database(format!("{} requires a {} reference", kind, predecessor))
            })?;
            let exists = self
                .staged
                .sacraments
                .get(&predecessor)
                .is_some_and(|table| table.contains_key(&predecessor_id));
            if !exists {
                return Err(StoreError::Database(format!(
                    "{} references unknown {} {}",
                    kind, predecessor, predecessor_id
                )));
            }
            if self.find_successor(kind, predecessor_id).await?.is_some() {
                return Err(StoreError::UniqueViolation(format!(
                    "{}_{}_key",
                    kind.collection(),
                    predecessor.collection()
                )));
            }
        }

        let id = self.staged.next_id(kind.collection());
        let record = SacramentRecord {
            id,
            lineage: record.lineage,
            details: record.details,
            created_at: Utc::now(),
        };
        self.staged
            .sacraments
            .entry(kind)
            .or_default()
            .insert(id, record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password_hash: "hash".to_string(),
            display_name: None,
            role: "REGISTRAR".to_string(),
        }
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_is_discarded() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(new_user("clerk")).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_user_by_username("clerk").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_committed_transaction_is_visible() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        let user = tx.insert_user(new_user("clerk")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let found = tx.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found.username, "clerk");
    }

    #[tokio::test]
    async fn test_duplicate_username_is_unique_violation() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(new_user("clerk")).await.unwrap();

        let err = tx.insert_user(new_user("clerk")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_expired_filter_keeps_live_tokens() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut tx = store.begin().await.unwrap();
        let user = tx.insert_user(new_user("clerk")).await.unwrap();

        for (hash, offset) in [("old", -5), ("live", 5)] {
            tx.insert_refresh_token(NewRefreshToken {
                user_id: user.id,
                token_hash: hash.to_string(),
                issued_at: now - Duration::minutes(10),
                expires_at: now + Duration::minutes(offset),
            })
            .await
            .unwrap();
        }

        assert_eq!(tx.delete_refresh_tokens_expired_before(now).await.unwrap(), 1);
        assert!(tx.find_refresh_token_for_update("live").await.unwrap().is_some());
        assert!(tx.find_refresh_token_for_update("old").await.unwrap().is_none());
    }
}
