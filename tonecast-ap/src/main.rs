//! Tonecast Audio Player (tonecast-ap) - Main entry point
//!
//! Playback daemon for multi-room audio: players decode a playlist and
//! fan each track out to any number of sound cards in lock-step,
//! controlled over a REST API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tonecast_ap::api::{create_router, AppContext};
use tonecast_ap::audio::{CpalBackend, OutputBackend};
use tonecast_ap::config::Config;
use tonecast_ap::player::PlayerController;

/// Command-line arguments for tonecast-ap
#[derive(Parser, Debug)]
#[command(name = "tonecast-ap")]
#[command(about = "Audio Player daemon for Tonecast")]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "TONECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the configuration file
    #[arg(short, long, env = "TONECAST_AP_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tonecast_ap=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(port) = args.port {
        config.port = port;
    }

    info!("Starting Tonecast Audio Player on port {}", config.port);

    // Initialize the audio backend and the player registry
    let backend: Arc<dyn OutputBackend> = Arc::new(CpalBackend::new());
    let controller = Arc::new(
        PlayerController::new(config.clone(), backend)
            .context("Failed to initialize player controller")?,
    );
    info!("Player controller initialized");

    // Build the application router
    let app = create_router(AppContext {
        controller: Arc::clone(&controller),
    });

    // Create socket address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("Starting HTTP server on {}", addr);

    // Create and run the server
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Release every player's audio devices before exiting
    if let Err(e) = controller.dispose() {
        warn!("Controller dispose failed: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
