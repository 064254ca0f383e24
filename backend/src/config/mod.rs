//! Configuration management for the church registry
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use std::env;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

/// Signing secret used when `JWT_SECRET` is absent outside production.
const DEVELOPMENT_JWT_SECRET: &str = "development-only-signing-secret-change-me-0001";

/// Accepted access token lifetimes, in seconds (up to one day)
const ACCESS_TOKEN_TTL_SECONDS: RangeInclusive<i64> = 1..=86_400;

/// Accepted refresh token lifetimes, in days
const REFRESH_TOKEN_TTL_DAYS: RangeInclusive<i64> = 1..=365;

/// Accepted sweep periods, in seconds (up to one week)
const SWEEP_INTERVAL_SECONDS: RangeInclusive<u64> = 1..=604_800;

/// Parse an optional variable, keeping only values inside `range`
fn parse_in_range<T>(raw: Option<String>, range: RangeInclusive<T>, default: T) -> T
where
    T: FromStr + PartialOrd,
{
    raw.and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| range.contains(v))
        .unwrap_or(default)
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Administrator account created at startup when it does not exist yet
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// HMAC secret for access token signing, at least 32 bytes
    pub jwt_secret: String,

    /// Access token TTL in seconds, 1 to 86400 (default: 900 = 15 minutes)
    pub jwt_access_token_ttl_seconds: i64,

    /// Refresh token TTL in days, 1 to 365 (default: 7)
    pub refresh_token_ttl_days: i64,

    /// Period of the expired refresh token sweep (default: 3600 = hourly)
    pub refresh_token_sweep_interval_seconds: u64,

    /// bcrypt work factor for stored password hashes
    pub bcrypt_cost: u32,

    /// Optional administrator seeded at startup
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .unwrap_or(5);

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS").ok();

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) => secret,
            Err(_) if environment.is_production() => {
                return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()))
            }
            Err(_) => DEVELOPMENT_JWT_SECRET.to_string(),
        };

        if jwt_secret.len() < 32 {
            return Err(ConfigError::InvalidValue(
                "JWT_SECRET must be at least 32 bytes".to_string(),
            ));
        }

        let jwt_access_token_ttl_seconds = parse_in_range(
            env::var("JWT_ACCESS_TOKEN_TTL_SECONDS").ok(),
            ACCESS_TOKEN_TTL_SECONDS,
            900,
        );

        let refresh_token_ttl_days =
            parse_in_range(env::var("REFRESH_TOKEN_TTL_DAYS").ok(), REFRESH_TOKEN_TTL_DAYS, 7);

        let refresh_token_sweep_interval_seconds = parse_in_range(
            env::var("REFRESH_TOKEN_SWEEP_INTERVAL_SECONDS").ok(),
            SWEEP_INTERVAL_SECONDS,
            3600,
        );

        let bcrypt_cost =
            parse_in_range(env::var("BCRYPT_COST").ok(), 4..=31, bcrypt::DEFAULT_COST);

        let bootstrap_admin = match (env::var("ADMIN_USERNAME"), env::var("ADMIN_PASSWORD")) {
            (Ok(username), Ok(password)) if !username.is_empty() && !password.is_empty() => {
                Some(BootstrapAdmin {
                    username,
                    password,
                    display_name: env::var("ADMIN_DISPLAY_NAME").ok(),
                })
            }
            _ => None,
        };

        Ok(Config {
            database_url,
            environment,
            port,
            db_max_connections,
            cors_allowed_origins,
            log_level,
            jwt_secret,
            jwt_access_token_ttl_seconds,
            refresh_token_ttl_days,
            refresh_token_sweep_interval_seconds,
            bcrypt_cost,
            bootstrap_admin,
        })
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> String {
        // Mask password in database URL for logging
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let prefix = &self.database_url[..colon_pos + 1];
                let suffix = &self.database_url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.database_url.clone()
    }
}
