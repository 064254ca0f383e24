//! Authentication HTTP handlers
//!
//! Password login and refresh token session endpoints.

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::WithRejection;
use std::sync::Arc;
use validator::Validate;

use super::AuthenticatedUser;
use crate::auth::SessionManager;
use crate::error::ApiError;
use crate::models::{
    AuthTokensResponse, LoginRequest, LogoutAllResponse, Principal, RefreshTokenRequest,
};

/// POST /api/auth/login - Exchange username and password for tokens
pub async fn login(
    State(sessions): State<Arc<SessionManager>>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<Json<AuthTokensResponse>, ApiError> {
    req.validate()?;

    let tokens = sessions.login(&req.username, &req.password).await?;

    Ok(Json(tokens.into()))
}

/// POST /api/auth/refresh - Rotate a refresh token
pub async fn refresh_token(
    State(sessions): State<Arc<SessionManager>>,
    WithRejection(Json(req), _): WithRejection<Json<RefreshTokenRequest>, ApiError>,
) -> Result<Json<AuthTokensResponse>, ApiError> {
    req.validate()?;

    let tokens = sessions.refresh(&req.refresh_token).await?;

    Ok(Json(tokens.into()))
}

/// POST /api/auth/logout - Revoke the presented refresh token
pub async fn logout(
    State(sessions): State<Arc<SessionManager>>,
    WithRejection(Json(req), _): WithRejection<Json<RefreshTokenRequest>, ApiError>,
) -> Result<StatusCode, ApiError> {
    sessions.logout(&req.refresh_token).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/logout-all - Revoke all sessions for the current user
pub async fn logout_all(
    State(sessions): State<Arc<SessionManager>>,
    user: AuthenticatedUser,
) -> Result<Json<LogoutAllResponse>, ApiError> {
    let revoked_sessions = sessions.logout_all(&user.principal).await?;

    Ok(Json(LogoutAllResponse { revoked_sessions }))
}

/// GET /api/auth/me - Current authenticated user
pub async fn get_current_user(user: AuthenticatedUser) -> Json<Principal> {
    Json(user.principal)
}
