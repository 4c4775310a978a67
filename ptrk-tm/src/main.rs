//! ptrk-tm (Template Manager) - Main entry point
//!
//! Serves milestone template administration, component progress updates and
//! the engine event stream for one PTRK database.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ptrk_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use ptrk_common::ProgressEngine;
use ptrk_tm::{build_router, AppState};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MODULE_NAME: &str = "ptrk-tm";

/// Command-line arguments for ptrk-tm
#[derive(Parser, Debug)]
#[command(name = "ptrk-tm")]
#[command(about = "Milestone template manager for PTRK")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "PTRK_TM_PORT")]
    port: Option<u16>,

    /// Root folder holding ptrk.db
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to ~/.config/ptrk/ptrk-tm.toml)
    #[arg(short, long, env = "PTRK_TM_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder)
        .with_config_file(args.config);
    let config_path = resolver.config_file_path();
    let config = TomlConfig::load_or_default(config_path.as_deref());

    let log_file = config
        .logging
        .open_log_file()
        .context("Failed to open log file")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "ptrk_tm={level},ptrk_common={level},tower_http={level}",
                    level = config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(log_file.map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
        }))
        .init();

    info!("Starting PTRK Template Manager (ptrk-tm) v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }
    if let Some(path) = &config.logging.log_file {
        info!("Log file: {}", path.display());
    }

    let initializer = RootFolderInitializer::new(resolver.resolve());
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let engine = ProgressEngine::open(&db_path, &config.engine)
        .await
        .context("Failed to initialize progress engine")?;
    info!(
        recalc_chunk_size = config.engine.recalc_chunk_size,
        "Progress engine initialized"
    );

    let state = AppState::new(engine);
    let shutdown = state.shutdown.clone();
    let app = build_router(state);

    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", config.server.host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("ptrk-tm listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
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
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
