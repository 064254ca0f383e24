//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::{SessionManager, TokenIssuer};
use crate::lineage::SacramentRegistry;
use crate::store::Store;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub registry: Arc<SacramentRegistry>,
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(
        sessions: Arc<SessionManager>,
        registry: Arc<SacramentRegistry>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            sessions,
            registry,
            store,
        }
    }
}

impl FromRef<AppState> for Arc<SessionManager> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for Arc<TokenIssuer> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.sessions.issuer().clone()
    }
}

impl FromRef<AppState> for Arc<SacramentRegistry> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.registry.clone()
    }
}

impl FromRef<AppState> for Arc<dyn Store> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.store.clone()
    }
}
