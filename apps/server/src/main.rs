mod api;
mod config;
mod error;
mod main_lib;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use quizsync_core::LocalStore;

use crate::config::ServerConfig;
use crate::main_lib::{build_state, spawn_event_logger};

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    // Core and storage crates log through the `log` facade.
    tracing_log::LogTracer::init().context("Failed to bridge log records")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let config = ServerConfig::from_env()?;
    let state = build_state(&config)?;

    state.coordinator.start();
    let event_logger = spawn_event_logger(&state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(listener, api::app_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down");
    state.coordinator.stop();
    event_logger.abort();
    state.store.close().await?;
    Ok(())
}
