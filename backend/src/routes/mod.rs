//! Route definitions for the registry API

mod auth;
mod sacraments;

use axum::{routing::get, Router};

use crate::handlers::health::health_check;
use crate::state::AppState;

pub use auth::auth_routes;
pub use sacraments::sacrament_routes;

/// All API routes bound to `state`. Cross-cutting layers are added by the caller.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(auth_routes())
        .merge(sacrament_routes())
        .with_state(state)
}
