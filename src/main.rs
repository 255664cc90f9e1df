//! Arena Game Server - Authoritative two-player real-time arena server
//!
//! This is the main entry point for the game server. It handles:
//! - WebSocket connections for matchmaking and live play
//! - Per-room simulation and state broadcast
//! - Graceful shutdown of running rooms

mod app;
mod config;
mod game;
mod http;
mod matchmaking;
mod registry;
mod util;
mod ws;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::game::CardCatalog;
use crate::http::build_router;

/// How long rooms get to deliver their final messages on shutdown
const ROOM_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting Arena Game Server");
    info!("Server address: {}", config.server_addr);

    let catalog = match &config.card_catalog_path {
        Some(path) => {
            let catalog = CardCatalog::load(path)?;
            info!(path = %path.display(), cards = catalog.len(), "Loaded card catalog");
            catalog
        }
        None => CardCatalog::standard(),
    };

    info!(
        tick_rate_hz = config.game.tick_rate_hz,
        elixir_interval_ms = config.game.elixir_interval.as_millis() as u64,
        cards = catalog.len(),
        "Game settings"
    );

    // Create application state
    let state = AppState::new(config.clone(), catalog);
    let registry = state.registry.clone();

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let stopped = registry.shutdown();
    info!(rooms = stopped, "Stopping rooms");

    let drained = tokio::time::timeout(ROOM_DRAIN_TIMEOUT, async {
        while registry.rooms().active_rooms() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!(
            remaining = registry.rooms().active_rooms(),
            "Rooms still running at shutdown"
        );
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
