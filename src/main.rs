//! Spyglass: a control-plane API for a running session daemon.
//!
//! This is the application entry point. It initializes tracing, loads
//! configuration from TOML files, creates the session handle, starts the
//! API server, and runs until SIGINT.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spyglass::config::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use spyglass::server::ApiServer;
use spyglass::session::Session;

/// Spyglass: HTTP(S) and WebSocket control plane for a session daemon
#[derive(Parser, Debug)]
#[command(name = "spyglass", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "spyglass=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration first so the logging format is honored
    let config = AppConfig::load(&args.config)?;

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Loaded configuration");

    let session = Session::new();
    session
        .record_event("session.started", serde_json::json!({}))
        .await;

    let store = Arc::new(RwLock::new(config.api));
    let server = ApiServer::new(store, session);

    server.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, stopping API server");

    server.stop().await?;

    Ok(())
}
