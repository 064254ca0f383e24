//! Sacrament lineage rules against the in-memory store

mod common;

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    use church_registry_server::lineage::{LineageError, SacramentKind, SacramentRegistry};
    use church_registry_server::models::{
        NewRefreshToken, NewSacrament, NewUser, RefreshToken, SacramentDetails, SacramentRecord,
        User,
    };
    use church_registry_server::store::{
        MemoryStore, RefreshTokenRepo, SacramentRepo, Store, StoreResult, StoreTx, UserRepo,
    };

    use super::common::{self, baptism, communion, confirmation, harness, holy_order, marriage};

    /// Memory store whose transactions never report an existing successor,
    /// so only the insert itself can detect a duplicate
    struct SuccessorBlindStore(MemoryStore);

    struct SuccessorBlindTx(Box<dyn StoreTx>);

    #[async_trait]
    impl Store for SuccessorBlindStore {
        async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
            Ok(Box::new(SuccessorBlindTx(self.0.begin().await?)))
        }

        async fn health_check(&self) -> StoreResult<()> {
            self.0.health_check().await
        }
    }

    #[async_trait]
    impl UserRepo for SuccessorBlindTx {
        async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
            self.0.find_user_by_username(username).await
        }

        async fn find_user_by_id(&mut self, id: i64) -> StoreResult<Option<User>> {
            self.0.find_user_by_id(id).await
        }

        async fn insert_user(&mut self, user: NewUser) -> StoreResult<User> {
            self.0.insert_user(user).await
        }
    }

    #[async_trait]
    impl RefreshTokenRepo for SuccessorBlindTx {
        async fn find_refresh_token_for_update(
            &mut self,
            token_hash: &str,
        ) -> StoreResult<Option<RefreshToken>> {
            self.0.find_refresh_token_for_update(token_hash).await
        }

        async fn insert_refresh_token(
            &mut self,
            token: NewRefreshToken,
        ) -> StoreResult<RefreshToken> {
            self.0.insert_refresh_token(token).await
        }

        async fn delete_refresh_token(&mut self, token_hash: &str) -> StoreResult<u64> {
            self.0.delete_refresh_token(token_hash).await
        }

        async fn delete_refresh_tokens_for_user(&mut self, user_id: i64) -> StoreResult<u64> {
            self.0.delete_refresh_tokens_for_user(user_id).await
        }

        async fn delete_refresh_tokens_expired_before(
            &mut self,
            cutoff: DateTime<Utc>,
        ) -> StoreResult<u64> {
            self.0.delete_refresh_tokens_expired_before(cutoff).await
        }
    }

    #[async_trait]
    impl SacramentRepo for SuccessorBlindTx {
        async fn find_sacrament(
            &mut self,
            kind: SacramentKind,
            id: i64,
        ) -> StoreResult<Option<SacramentRecord>> {
            self.0.find_sacrament(kind, id).await
        }

        async fn lock_sacrament(
            &mut self,
            kind: SacramentKind,
            id: i64,
        ) -> StoreResult<Option<SacramentRecord>> {
            self.0.lock_sacrament(kind, id).await
        }

        async fn find_successor(
            &mut self,
            _kind: SacramentKind,
            _predecessor_id: i64,
        ) -> StoreResult<Option<SacramentRecord>> {
            Ok(None)
        }

        async fn insert_sacrament(&mut self, record: NewSacrament) -> StoreResult<SacramentRecord> {
            self.0.insert_sacrament(record).await
        }
    }

    #[async_trait]
    impl StoreTx for SuccessorBlindTx {
        async fn commit(self: Box<Self>) -> StoreResult<()> {
            self.0.commit().await
        }
    }

    /// Baptism, communion and confirmation; returns the confirmation id
    async fn confirmed(h: &common::Harness) -> i64 {
        let b = h
            .registry
            .create(None, SacramentDetails::Baptism(baptism()))
            .await
            .unwrap();
        let c = h
            .registry
            .create(Some(b.id), SacramentDetails::FirstHolyCommunion(communion()))
            .await
            .unwrap();
        h.registry
            .create(Some(c.id), SacramentDetails::Confirmation(confirmation()))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_records_inherit_their_ancestors() {
        let h = harness().await;
        let confirmation_id = confirmed(&h).await;

        let confirmation = h
            .registry
            .get(SacramentKind::Confirmation, confirmation_id)
            .await
            .unwrap();
        let baptism_id = confirmation.lineage.baptism_id.unwrap();
        let communion_id = confirmation.lineage.communion_id.unwrap();
        assert_eq!(confirmation.lineage.confirmation_id, None);

        let marriage = h
            .registry
            .create(Some(confirmation_id), SacramentDetails::Marriage(marriage()))
            .await
            .unwrap();
        assert_eq!(marriage.lineage.baptism_id, Some(baptism_id));
        assert_eq!(marriage.lineage.communion_id, Some(communion_id));
        assert_eq!(marriage.lineage.confirmation_id, Some(confirmation_id));
        assert_eq!(marriage.predecessor_id(), Some(confirmation_id));
    }

    #[tokio::test]
    async fn test_second_successor_of_same_kind_is_rejected() {
        let h = harness().await;
        let b = h
            .registry
            .create(None, SacramentDetails::Baptism(baptism()))
            .await
            .unwrap();

        h.registry
            .create(Some(b.id), SacramentDetails::FirstHolyCommunion(communion()))
            .await
            .unwrap();
        let err = h
            .registry
            .create(Some(b.id), SacramentDetails::FirstHolyCommunion(communion()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LineageError::AlreadyRecorded {
                kind: SacramentKind::FirstHolyCommunion,
                predecessor: SacramentKind::Baptism,
                ..
            }
        ));
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_duplicate_caught_at_insert_is_reported_as_already_recorded() {
        let h = harness().await;
        let b = h
            .registry
            .create(None, SacramentDetails::Baptism(baptism()))
            .await
            .unwrap();
        let first = h
            .registry
            .create(Some(b.id), SacramentDetails::FirstHolyCommunion(communion()))
            .await
            .unwrap();

        let blind = SacramentRegistry::new(Arc::new(SuccessorBlindStore(h.store.clone())));
        let mut second = communion();
        second.officiating_priest = "Fr. Second".to_string();
        let err = blind
            .create(Some(b.id), SacramentDetails::FirstHolyCommunion(second))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LineageError::AlreadyRecorded {
                kind: SacramentKind::FirstHolyCommunion,
                predecessor: SacramentKind::Baptism,
                predecessor_id,
            } if predecessor_id == b.id
        ));
        assert_eq!(
            err.to_string(),
            "First Holy Communion already exists for this baptism"
        );

        let stored = h
            .registry
            .get(SacramentKind::FirstHolyCommunion, first.id)
            .await
            .unwrap();
        assert_eq!(stored, first);
        let history = h.registry.history(b.id).await.unwrap();
        assert_eq!(history.first_holy_communion, Some(first));
    }

    #[tokio::test]
    async fn test_holy_order_after_marriage_is_rejected() {
        let h = harness().await;
        let confirmation_id = confirmed(&h).await;

        h.registry
            .create(Some(confirmation_id), SacramentDetails::Marriage(marriage()))
            .await
            .unwrap();
        let err = h
            .registry
            .create(Some(confirmation_id), SacramentDetails::HolyOrder(holy_order()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LineageError::MutuallyExclusive {
                kind: SacramentKind::HolyOrder,
                existing: SacramentKind::Marriage,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_marriage_after_holy_order_is_rejected() {
        let h = harness().await;
        let confirmation_id = confirmed(&h).await;

        h.registry
            .create(Some(confirmation_id), SacramentDetails::HolyOrder(holy_order()))
            .await
            .unwrap();
        let err = h
            .registry
            .create(Some(confirmation_id), SacramentDetails::Marriage(marriage()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LineageError::MutuallyExclusive {
                kind: SacramentKind::Marriage,
                existing: SacramentKind::HolyOrder,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_predecessor_is_not_found() {
        let h = harness().await;

        let err = h
            .registry
            .create(Some(999), SacramentDetails::FirstHolyCommunion(communion()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LineageError::NotFound {
                kind: SacramentKind::Baptism,
                id: 999
            }
        ));
    }

    #[tokio::test]
    async fn test_predecessor_presence_must_match_kind() {
        let h = harness().await;

        let err = h
            .registry
            .create(Some(1), SacramentDetails::Baptism(baptism()))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::InvalidReference(_)));

        let err = h
            .registry
            .create(None, SacramentDetails::Confirmation(confirmation()))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_invalid_fields_create_nothing() {
        let h = harness().await;
        let mut details = baptism();
        details.surname = "  ".to_string();

        let err = h
            .registry
            .create(None, SacramentDetails::Baptism(details))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::Validation(_)));

        let created = h
            .registry
            .create(None, SacramentDetails::Baptism(baptism()))
            .await
            .unwrap();
        assert_eq!(created.id, 1);
    }

    #[tokio::test]
    async fn test_concurrent_terminal_creation_has_exactly_one_winner() {
        let h = harness().await;
        let confirmation_id = confirmed(&h).await;

        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let registry = h.registry.clone();
                let details = if i % 2 == 0 {
                    SacramentDetails::Marriage(marriage())
                } else {
                    SacramentDetails::HolyOrder(holy_order())
                };
                tokio::spawn(async move { registry.create(Some(confirmation_id), details).await })
            })
            .collect();

        let mut successes = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(matches!(
                    e,
                    LineageError::AlreadyRecorded { .. } | LineageError::MutuallyExclusive { .. }
                )),
            }
        }
        assert_eq!(successes, 1);

        let history = h.registry.history(1).await.unwrap();
        assert!(history.marriage.is_some() ^ history.holy_order.is_some());
    }

    #[tokio::test]
    async fn test_history_collects_the_chain() {
        let h = harness().await;

        let b = h
            .registry
            .create(None, SacramentDetails::Baptism(baptism()))
            .await
            .unwrap();
        let empty = h.registry.history(b.id).await.unwrap();
        assert!(empty.first_holy_communion.is_none());
        assert!(empty.confirmation.is_none());

        let confirmation_id = confirmed(&h).await;
        h.registry
            .create(Some(confirmation_id), SacramentDetails::HolyOrder(holy_order()))
            .await
            .unwrap();

        let full = h.registry.history(2).await.unwrap();
        assert_eq!(full.baptism.id, 2);
        assert_eq!(
            full.confirmation.as_ref().map(|c| c.id),
            Some(confirmation_id)
        );
        assert!(full.marriage.is_none());
        assert!(full.holy_order.is_some());

        let err = h.registry.history(404).await.unwrap_err();
        assert!(matches!(err, LineageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_unknown_record_is_not_found() {
        let h = harness().await;
        let err = h
            .registry
            .get(SacramentKind::Marriage, 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LineageError::NotFound {
                kind: SacramentKind::Marriage,
                id: 1
            }
        ));
    }
}
