//! Request tracing middleware

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// First hop of `x-forwarded-for`, else `x-real-ip`
fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string());

    forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
    })
}

/// Log each request with its status and duration
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = client_ip(request.headers());

    let start = Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let status: StatusCode = response.status();
    if status.is_server_error() {
        tracing::error!(
            %method,
            %path,
            ?client_ip,
            status = status.as_u16(),
            duration_ms,
            "Request failed"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            %method,
            %path,
            ?client_ip,
            status = status.as_u16(),
            duration_ms,
            "Request rejected"
        );
    } else {
        tracing::info!(
            %method,
            %path,
            ?client_ip,
            status = status.as_u16(),
            duration_ms,
            "Request completed"
        );
    }

    response
}
