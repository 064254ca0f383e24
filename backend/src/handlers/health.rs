//! Health check

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::store::Store;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: String,
    pub version: &'static str,
}

/// GET /health
pub async fn health_check(State(store): State<Arc<dyn Store>>) -> Json<HealthResponse> {
    let (status, database) = match store.health_check().await {
        Ok(()) => ("healthy", "connected".to_string()),
        Err(e) => ("unhealthy", format!("error: {}", e)),
    };

    Json(HealthResponse {
        status,
        database,
        version: env!("CARGO_PKG_VERSION"),
    })
}
