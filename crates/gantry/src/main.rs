//! Gantry Server
//!
//! Addin host with an HTTP call API and runtime-installable services.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use gantry::addin::{AddinManager, DylibLoader};
use gantry::config::HostConfig;
use gantry::server::{AppState, create_router};
use gantry::services::{ServiceRegistry, system_service};

/// Gantry Addin Host
#[derive(Parser, Debug)]
#[command(name = "gantry")]
#[command(about = "Gantry addin host", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "gantry.toml")]
    config: PathBuf,

    /// Override the configured host address
    #[arg(long)]
    host: Option<String>,

    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gantry=info,tower_http=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command line arguments
    let args = Args::parse();

    info!("Starting gantry host v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration, with CLI overrides on top
    let mut config = match HostConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(
                "Failed to load configuration from {}: {}",
                args.config.display(),
                e
            );
            std::process::exit(1);
        }
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    std::fs::create_dir_all(&config.addins.staging_dir)?;
    std::fs::create_dir_all(&config.addins.addin_dir)?;
    if let Some(parent) = config.addins.manifest.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Create core components
    let registry = Arc::new(ServiceRegistry::new());
    let loader = Arc::new(DylibLoader::new(registry.clone()));
    let manager = Arc::new(AddinManager::new(
        loader,
        config.addins.staging_dir.clone(),
        config.addins.addin_dir.clone(),
        config.addins.manifest.clone(),
    ));

    registry.register(system_service(
        &registry,
        &manager,
        config.addins.staging_dir.clone(),
    ))?;

    // Bring previously installed addins back up before accepting calls
    match manager.restore() {
        Ok(0) => {}
        Ok(restored) => info!("Restored {} addins", restored),
        Err(e) => {
            error!("Failed to restore addins: {}", e);
            std::process::exit(1);
        }
    }

    info!("Serving {} services", registry.len());

    // Create application state and router
    let state = AppState::new(registry, manager, config.call_timeout());
    let app = create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Call endpoint: http://{}/rpc", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
