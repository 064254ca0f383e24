//! Authentication extractor
//!
//! Verifies the bearer access token and exposes the caller's principal.
//! Verification is signature and expiry only; revoking refresh tokens does
//! not invalidate access tokens already issued.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{JwtError, TokenIssuer};
use crate::models::Principal;

/// Authenticated user extracted from the access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub principal: Principal,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

/// Error response for authentication failures
#[derive(Debug, Serialize)]
struct AuthRejection {
    error: RejectionDetails,
}

#[derive(Debug, Serialize)]
struct RejectionDetails {
    code: &'static str,
    message: &'static str,
}

impl AuthRejection {
    fn new(code: &'static str, message: &'static str) -> Self {
        Self {
            error: RejectionDetails { code, message },
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(self)).into_response()
    }
}

/// Extractor for authenticated users
///
/// ```rust,ignore
/// async fn protected_handler(user: AuthenticatedUser) -> impl IntoResponse {
///     format!("Hello, {}", user.principal.username)
/// }
/// ```
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<TokenIssuer>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AuthRejection::new(
                        "MISSING_TOKEN",
                        "Authorization header with Bearer token required",
                    )
                    .into_response()
                })?;

        let issuer = Arc::<TokenIssuer>::from_ref(state);

        let claims = issuer.verify(bearer.token()).map_err(|e| {
            let (code, message) = match e {
                JwtError::TokenExpired => ("TOKEN_EXPIRED", "Token has expired"),
                _ => ("INVALID_TOKEN", "Invalid token"),
            };
            AuthRejection::new(code, message).into_response()
        })?;

        Ok(AuthenticatedUser {
            principal: claims.principal(),
            expires_at: claims.expires_at(),
            jti: claims.jti,
        })
    }
}
