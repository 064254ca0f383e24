//! Store behaviour against a real PostgreSQL database

mod common;

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use sqlx::PgPool;
    use std::sync::Arc;
    use uuid::Uuid;

    use church_registry_server::auth::{AuthError, PasswordHasher, SessionManager, TokenIssuer};
    use church_registry_server::lineage::{LineageError, SacramentRegistry};
    use church_registry_server::models::SacramentDetails;
    use church_registry_server::store::{PgStore, RefreshTokenRepo, Store, StoreTx};

    use super::common::{baptism, communion, confirmation, holy_order, marriage, SECRET};

    /// Helper to create a migrated test database pool
    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/church_registry_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn services(pool: PgPool) -> (Arc<SessionManager>, Arc<SacramentRegistry>, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
        let issuer = Arc::new(TokenIssuer::new(SECRET, Duration::seconds(900)).unwrap());
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            issuer,
            PasswordHasher::new(4).unwrap(),
            Duration::days(7),
        ));
        let registry = Arc::new(SacramentRegistry::new(store.clone()));
        (sessions, registry, store)
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_refresh_rotation_is_single_use() {
        let (sessions, _, _) = services(setup_test_db().await);
        let username = format!("clerk-{}", Uuid::new_v4());
        sessions
            .create_user(&username, "password", None, "REGISTRAR")
            .await
            .unwrap();

        let tokens = sessions.login(&username, "password").await.unwrap();

        let attempts: Vec<_> = (0..6)
            .map(|_| {
                let sessions = sessions.clone();
                let value = tokens.refresh_token.clone();
                tokio::spawn(async move { sessions.refresh(&value).await })
            })
            .collect();

        let mut successes = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(matches!(e, AuthError::InvalidRefreshToken)),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_sweep_deletes_expired_rows() {
        let (sessions, _, store) = services(setup_test_db().await);
        let username = format!("clerk-{}", Uuid::new_v4());
        let user = sessions
            .create_user(&username, "password", None, "REGISTRAR")
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_refresh_token(church_registry_server::models::NewRefreshToken {
            user_id: user.id,
            token_hash: Uuid::new_v4().simple().to_string(),
            issued_at: Utc::now() - Duration::days(8),
            expires_at: Utc::now() - Duration::days(1),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let removed = tx
            .delete_refresh_tokens_expired_before(Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert!(removed >= 1);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_lineage_rules_hold_in_postgres() {
        let (_, registry, _) = services(setup_test_db().await);

        let b = registry
            .create(None, SacramentDetails::Baptism(baptism()))
            .await
            .unwrap();
        let c = registry
            .create(Some(b.id), SacramentDetails::FirstHolyCommunion(communion()))
            .await
            .unwrap();
        let duplicate = registry
            .create(Some(b.id), SacramentDetails::FirstHolyCommunion(communion()))
            .await
            .unwrap_err();
        assert!(matches!(duplicate, LineageError::AlreadyRecorded { .. }));

        let conf = registry
            .create(Some(c.id), SacramentDetails::Confirmation(confirmation()))
            .await
            .unwrap();
        assert_eq!(conf.lineage.baptism_id, Some(b.id));
        assert_eq!(conf.lineage.communion_id, Some(c.id));
        let confirmation_id = conf.id;

        let attempts: Vec<_> = (0..6)
            .map(|i| {
                let registry = registry.clone();
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
            if attempt.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);

        let history = registry.history(b.id).await.unwrap();
        assert!(history.marriage.is_some() ^ history.holy_order.is_some());
    }
}
