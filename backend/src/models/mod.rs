//! Data models for the church registry backend

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};

pub mod auth;
pub mod sacrament;

pub use auth::*;
pub use sacrament::*;

/// Registry user (a registrar or administrator)
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub role: String,
}

/// Authenticated identity passed explicitly into every operation that needs it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub role: String,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            role: user.role.clone(),
        }
    }
}
