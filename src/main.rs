//! pgfence-proxy - Intercepting PostgreSQL proxy with a statement firewall
//!
//! This binary provides a standalone proxy that:
//! - Authenticates clients against per-user passwords from its config
//! - Connects upstream with a single service account
//! - Rejects queries outside the configured table and condition policy

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use pgfence_proxy::{config, Listener, Result};

#[derive(Parser)]
#[command(name = "pgfence-proxy")]
#[command(version)]
#[command(about = "Intercepting PostgreSQL proxy with a statement firewall")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Override listen address
    #[arg(long)]
    listen_address: Option<String>,

    /// Override listen port
    #[arg(long)]
    listen_port: Option<u16>,

    /// Enable verbose/debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = config::load_config(&cli.config)?;

    // Initialize logging
    // Priority: --verbose flag, then RUST_LOG env var, then the config file
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone())
    };
    tracing_subscriber::fmt().with_env_filter(&log_level).init();

    info!("Starting pgfence-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from {:?}", cli.config);

    // Apply CLI overrides
    if let Some(addr) = cli.listen_address {
        config.server.listen_address = addr;
    }
    if let Some(port) = cli.listen_port {
        config.server.listen_port = port;
    }

    let config = Arc::new(config);

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let listener = Listener::bind(Arc::clone(&config), shutdown_tx.clone()).await?;
    let stats = listener.stats();

    info!(
        "Proxy ready: listening on {}:{} -> {}",
        config.server.listen_address,
        config.server.listen_port,
        config.upstream.address(),
    );

    // Spawn the listener task
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listener.run().await {
            error!("Listener error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to install SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Send shutdown signal
    let _ = shutdown_tx.send(());

    // Wait for listener to finish
    let _ = listener_handle.await;

    info!(
        "Shutdown complete. Total connections handled: {}",
        stats.accepted()
    );

    Ok(())
}
