//! Sacrament record routes

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers::sacraments::{create_record, get_history, get_record};
use crate::handlers::AuthenticatedUser;
use crate::lineage::{SacramentKind, SacramentRegistry};
use crate::models::{
    BaptismDetails, ConfirmationRequest, FirstHolyCommunionRequest, HolyOrderRequest,
    MarriageRequest,
};
use crate::state::AppState;

/// Create sacrament routes: one collection per kind plus baptism history
pub fn sacrament_routes() -> Router<AppState> {
    let router = Router::new()
        .route("/api/baptisms", post(create_record::<BaptismDetails>))
        .route(
            "/api/first-holy-communions",
            post(create_record::<FirstHolyCommunionRequest>),
        )
        .route("/api/confirmations", post(create_record::<ConfirmationRequest>))
        .route("/api/marriages", post(create_record::<MarriageRequest>))
        .route("/api/holy-orders", post(create_record::<HolyOrderRequest>))
        .route("/api/baptisms/:id/history", get(get_history));

    SacramentKind::ALL.into_iter().fold(router, |router, kind| {
        router.route(
            &format!("/api/{}/:id", kind.collection()),
            get(
                move |State(registry): State<Arc<SacramentRegistry>>,
                      _user: AuthenticatedUser,
                      Path(id): Path<i64>| get_record(registry, kind, id),
            ),
        )
    })
}
