//! Sacrament record handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::AuthenticatedUser;
use crate::error::ApiError;
use crate::lineage::{SacramentKind, SacramentRegistry};
use crate::models::{SacramentRecord, SacramentRequest, SacramentalHistory};

/// POST /api/{collection} - Record a sacrament against its predecessor
pub async fn create_record<R>(
    State(registry): State<Arc<SacramentRegistry>>,
    user: AuthenticatedUser,
    WithRejection(Json(req), _): WithRejection<Json<R>, ApiError>,
) -> Result<(StatusCode, Json<SacramentRecord>), ApiError>
where
    R: SacramentRequest + DeserializeOwned + Send,
{
    let (predecessor_id, details) = req.into_parts();
    let record = registry.create(predecessor_id, details).await?;

    tracing::debug!(
        registrar = %user.principal.username,
        kind = ?record.kind(),
        id = record.id,
        "Record created"
    );

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/{collection}/:id
pub async fn get_record(
    registry: Arc<SacramentRegistry>,
    kind: SacramentKind,
    id: i64,
) -> Result<Json<SacramentRecord>, ApiError> {
    Ok(Json(registry.get(kind, id).await?))
}

/// GET /api/baptisms/:id/history - A baptism and all its descendants
pub async fn get_history(
    State(registry): State<Arc<SacramentRegistry>>,
    _user: AuthenticatedUser,
    Path(baptism_id): Path<i64>,
) -> Result<Json<SacramentalHistory>, ApiError> {
    Ok(Json(registry.history(baptism_id).await?))
}
