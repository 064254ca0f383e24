//! API handlers for the registry backend

pub mod auth;
pub mod health;
pub mod sacraments;

pub use crate::middleware::auth::AuthenticatedUser;
