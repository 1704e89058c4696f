use anyhow::Context;
use chrono::Utc;
use dotenvy::dotenv;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use moderation_server::{
    config::{Config, StorageBackend},
    create_router,
    repositories::Repositories,
    seeder, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let repos = Repositories::connect(&config).await?;

    // A fresh in-memory store has no accounts at all.
    if config.storage == StorageBackend::Memory {
        let admin = seeder::ensure_admin(repos.users.as_ref(), &config.seed_admin_username).await?;
        info!(
            username = %admin.username,
            token = %seeder::token_for(&config, &admin, Utc::now()),
            "Seeded in-memory admin"
        );
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let app = create_router(AppState::new(repos, config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Moderation server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
