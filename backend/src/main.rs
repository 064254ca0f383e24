//! Church Registry Backend Server
//!
//! Serves the registrar API: password login with rotating refresh tokens and
//! creation and lookup of sacrament records.

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;

use church_registry_server::auth::{ExpirySweeper, PasswordHasher, SessionManager, TokenIssuer};
use church_registry_server::config::Config;
use church_registry_server::lineage::SacramentRegistry;
use church_registry_server::state::AppState;
use church_registry_server::store::{PgStore, Store};
use church_registry_server::{db, middleware, routes};

/// Role given to the administrator seeded from configuration
const BOOTSTRAP_ADMIN_ROLE: &str = "ADMIN";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        "Starting church registry server"
    );

    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let issuer = Arc::new(TokenIssuer::new(
        &config.jwt_secret,
        chrono::Duration::seconds(config.jwt_access_token_ttl_seconds),
    )?);
    let passwords = PasswordHasher::new(config.bcrypt_cost)?;
    let sessions = Arc::new(SessionManager::new(
        store.clone(),
        issuer,
        passwords,
        chrono::Duration::days(config.refresh_token_ttl_days),
    ));
    let registry = Arc::new(SacramentRegistry::new(store.clone()));

    if let Some(admin) = &config.bootstrap_admin {
        let created = sessions
            .ensure_user(
                &admin.username,
                &admin.password,
                admin.display_name.clone(),
                BOOTSTRAP_ADMIN_ROLE,
            )
            .await
            .context("Failed to seed bootstrap administrator")?;
        if created {
            tracing::info!(username = %admin.username, "Bootstrap administrator created");
        }
    }

    let sweeper = ExpirySweeper::new(
        store.clone(),
        std::time::Duration::from_secs(config.refresh_token_sweep_interval_seconds),
    )
    .start();

    let app_state = AppState::new(sessions, registry, store);

    let app = routes::app(app_state)
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(configure_cors(config.cors_allowed_origins.as_deref()));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.stop().await;
    served.context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
