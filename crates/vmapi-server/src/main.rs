//! vmapi server entry point.
//!
//! Loads the YAML configuration, wires the libvirt connector into the
//! orchestrator and serves the HTTP API until SIGINT or SIGTERM.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use vmapi_core::VmOrchestrator;
use vmapi_server::{build_router, serve, LogFormat, ServerConfig};

/// vmapi - HTTP API for libvirt virtual machines
#[derive(Parser, Debug)]
#[command(name = "vmapi")]
#[command(about = "HTTP API for creating and managing libvirt virtual machines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the API server.
    Server {
        /// Path to the configuration file.
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server { config } => run_server(config).await,
    }
}

async fn run_server(config_path: PathBuf) -> anyhow::Result<()> {
    let config = ServerConfig::load(&config_path)?;
    init_tracing(&config)?;

    tracing::info!(config = %config_path.display(), "Starting vmapi server");
    tracing::debug!(?config, "Configuration loaded");

    let orchestrator = Arc::new(VmOrchestrator::new(
        config.hypervisor.orchestrator()?,
        Arc::new(config.hypervisor.connector()),
    ));
    let router = build_router(orchestrator, config.healthcheck.enabled);

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut shutdown_rx = shutdown_tx.subscribe();
    let addr = config.server.address;

    let mut server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.recv().await;
        };
        serve(router, addr, shutdown).await
    });

    tokio::select! {
        result = &mut server => {
            // The server stopped on its own, most likely a bind failure.
            result??;
            return Ok(());
        }
        signal = shutdown_signal() => {
            signal?;
        }
    }

    let delay = config.server.graceful_shutdown_delay;
    tracing::info!(grace_ms = delay.as_millis() as u64, "Shutting down server");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(delay, server).await {
        Ok(result) => {
            if let Err(e) = result? {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        Err(_) => {
            tracing::warn!("Graceful shutdown delay elapsed, dropping in-flight requests");
        }
    }

    tracing::info!("Server exiting");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    tracing::info!("Received shutdown signal");
    Ok(())
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(config: &ServerConfig) -> anyhow::Result<()> {
    let level: LevelFilter = config.logging.log_level.as_str().parse()?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
    Ok(())
}
