//! Copydesk - role-based content review service

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use copydesk::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db,
    services::{create_mailer, EmailQueue},
};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "copydesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Copydesk...");

    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");
    if config.auth.provider_secret.is_none() {
        tracing::warn!("auth.provider_secret is not set; no sessions can be opened");
    }

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let cache = create_cache(&config.cache);

    let mailer = create_mailer(&config.email);
    let queue = Arc::new(
        EmailQueue::new(mailer, config.email.max_attempts)
            .with_retry_backoff(Duration::from_millis(config.email.retry_backoff_ms)),
    );
    let _email_worker = queue.clone().spawn_worker();
    tracing::info!(enabled = config.email.enabled, "Email queue started");

    let state = AppState::new(pool.clone(), cache, queue, &config.auth);

    // Hourly sweep of expired sessions
    {
        let users = state.user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = users.purge_expired_sessions().await {
                    tracing::warn!("Session purge failed: {}", e);
                }
            }
        });
    }

    let app = api::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
