//! Middleware for the registry API
//!
//! Request tracing and bearer-token authentication.

pub mod auth;
mod tracing;

pub use auth::AuthenticatedUser;
pub use tracing::request_tracing;
