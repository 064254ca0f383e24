//! Authentication for registry staff
//!
//! - bcrypt password verification
//! - Short-lived JWT access tokens
//! - Rotating, single-use refresh tokens kept in a server-side ledger
//! - Background purge of expired ledger entries

mod jwt;
mod password;
mod service;
mod sweeper;

pub use jwt::{Claims, JwtError, SignedToken, TokenIssuer, MIN_SECRET_BYTES};
pub use password::{PasswordError, PasswordHasher};
pub use service::{AuthError, SessionManager};
pub use sweeper::{ExpirySweeper, SweeperHandle};
