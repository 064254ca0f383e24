//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use church_registry_server::auth::{PasswordHasher, SessionManager, TokenIssuer};
use church_registry_server::lineage::SacramentRegistry;
use church_registry_server::models::{
    BaptismDetails, CommunionDetails, ConfirmationDetails, HolyOrderDetails, MarriageDetails,
};
use church_registry_server::state::AppState;
use church_registry_server::store::{MemoryStore, Store};

pub const SECRET: &str = "integration-test-secret-that-is-long-enough";
pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "password";

pub struct Harness {
    pub store: MemoryStore,
    pub issuer: Arc<TokenIssuer>,
    pub sessions: Arc<SessionManager>,
    pub registry: Arc<SacramentRegistry>,
}

impl Harness {
    pub fn state(&self) -> AppState {
        AppState::new(
            self.sessions.clone(),
            self.registry.clone(),
            Arc::new(self.store.clone()),
        )
    }
}

/// Memory-backed services with one seeded administrator
pub async fn harness() -> Harness {
    harness_with_ttls(Duration::seconds(900), Duration::days(7)).await
}

pub async fn harness_with_ttls(access_ttl: Duration, refresh_ttl: Duration) -> Harness {
    let store = MemoryStore::new();
    let shared: Arc<dyn Store> = Arc::new(store.clone());

    let issuer = Arc::new(TokenIssuer::new(SECRET, access_ttl).unwrap());
    let sessions = Arc::new(SessionManager::new(
        shared.clone(),
        issuer.clone(),
        PasswordHasher::new(4).unwrap(),
        refresh_ttl,
    ));
    let registry = Arc::new(SacramentRegistry::new(shared));

    sessions
        .ensure_user(USERNAME, PASSWORD, Some("Parish Admin".to_string()), "ADMIN")
        .await
        .unwrap();

    Harness {
        store,
        issuer,
        sessions,
        registry,
    }
}

pub fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn baptism() -> BaptismDetails {
    BaptismDetails {
        baptism_name: "John".to_string(),
        surname: "Okeke".to_string(),
        gender: "MALE".to_string(),
        date_of_birth: date(2000, 1, 15),
        fathers_name: "Peter Okeke".to_string(),
        mothers_name: "Mary Okeke".to_string(),
        sponsor_names: "Paul Eze".to_string(),
        parish_id: None,
        address: None,
        parish_address: None,
        parent_address: Some("12 Market Road".to_string()),
    }
}

pub fn communion() -> CommunionDetails {
    CommunionDetails {
        communion_date: date(2008, 5, 4),
        officiating_priest: "Fr. Obi".to_string(),
        parish: "St. Mary".to_string(),
    }
}

pub fn confirmation() -> ConfirmationDetails {
    ConfirmationDetails {
        confirmation_date: date(2012, 6, 10),
        officiating_bishop: "Bishop Eze".to_string(),
        parish: Some("St. Mary".to_string()),
    }
}

pub fn marriage() -> MarriageDetails {
    MarriageDetails {
        partners_name: "Ada Nwosu".to_string(),
        marriage_date: date(2024, 2, 10),
        officiating_priest: "Fr. John".to_string(),
        parish: "St. Paul".to_string(),
    }
}

pub fn holy_order() -> HolyOrderDetails {
    HolyOrderDetails {
        ordination_date: date(2025, 8, 15),
        order_type: "PRIEST".to_string(),
        officiating_bishop: "Bishop Eze".to_string(),
        parish_id: None,
    }
}
