//! Background purge of expired refresh tokens

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::store::{RefreshTokenRepo, Store, StoreResult, StoreTx};

/// Periodically deletes refresh tokens whose expiry has passed
pub struct ExpirySweeper {
    store: Arc<dyn Store>,
    period: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn Store>, period: Duration) -> Self {
        Self { store, period }
    }

    /// Run one purge pass. Returns the number of tokens removed.
    pub async fn sweep_once(&self) -> StoreResult<u64> {
        let mut tx = self.store.begin().await?;
        let removed = tx.delete_refresh_tokens_expired_before(Utc::now()).await?;
        tx.commit().await?;
        Ok(removed)
    }

    /// Spawn the sweep loop. The first pass runs immediately.
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            tracing::info!(period_secs = self.period.as_secs(), "Starting refresh token sweeper");
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep_once().await {
                            Ok(0) => {}
                            Ok(purged) => tracing::info!(purged, "Purged expired refresh tokens"),
                            Err(e) => tracing::error!("Refresh token sweep failed: {}", e),
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            tracing::info!("Refresh token sweeper stopped");
        });

        SweeperHandle { shutdown_tx, task }
    }
}

/// Handle to a running sweeper
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the loop and wait for it to exit. A pass already in flight
    /// finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("Sweeper task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewRefreshToken, NewUser};
    use crate::store::{MemoryStore, UserRepo};
    use chrono::Duration as ChronoDuration;

    async fn seed(store: &MemoryStore) {
        let now = Utc::now();
        let mut tx = store.begin().await.unwrap();
        let user = tx
            .insert_user(NewUser {
                username: "clerk".to_string(),
                password_hash: "hash".to_string(),
                display_name: None,
                role: "REGISTRAR".to_string(),
            })
            .await
            .unwrap();
        for (hash, minutes) in [("stale-1", -30), ("stale-2", -1), ("live", 30)] {
            tx.insert_refresh_token(NewRefreshToken {
                user_id: user.id,
                token_hash: hash.to_string(),
                issued_at: now - ChronoDuration::hours(1),
                expires_at: now + ChronoDuration::minutes(minutes),
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();
    }

    async fn remaining(store: &MemoryStore, hash: &str) -> bool {
        let mut tx: Box<dyn StoreTx> = store.begin().await.unwrap();
        tx.find_refresh_token_for_update(hash).await.unwrap().is_some()
    }

    #[tokio::test]
    async fn test_sweep_once_removes_only_expired() {
        let store = MemoryStore::new();
        seed(&store).await;

        let sweeper = ExpirySweeper::new(Arc::new(store.clone()), Duration::from_secs(3600));
        assert_eq!(sweeper.sweep_once().await.unwrap(), 2);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);

        assert!(remaining(&store, "live").await);
        assert!(!remaining(&store, "stale-1").await);
    }

    #[tokio::test]
    async fn test_started_sweeper_purges_and_stops() {
        let store = MemoryStore::new();
        seed(&store).await;

        let handle =
            ExpirySweeper::new(Arc::new(store.clone()), Duration::from_millis(20)).start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        assert!(!remaining(&store, "stale-2").await);
        assert!(remaining(&store, "live").await);
    }
}
