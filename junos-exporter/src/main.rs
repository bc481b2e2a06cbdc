//! Prometheus exporter for Junos devices.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use junos_exporter::{AppState, ExporterConfig, HttpServer, Overrides, Scheduler, SshConnector};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Prometheus exporter for Junos devices.
#[derive(Parser, Debug)]
#[command(name = "junos-exporter")]
#[command(about = "Export Junos device metrics collected over NETCONF")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: String,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Metrics path (overrides config).
    #[arg(long)]
    path: Option<String>,

    /// Log level (trace, debug, info, warn, error). Overrides config.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ExporterConfig::load_with_overrides(
        &args.config,
        Overrides {
            listen: args.listen,
            path: args.path,
            log_level: args.log_level,
        },
    )?;

    junos_common::init_tracing(&config.logging)?;

    info!(
        config = %args.config,
        profiles = config.configs.len(),
        "Starting Junos exporter"
    );

    let listen_addr = config
        .web
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;
    let metrics_path = config.web.path.clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = AppState::new(
        Arc::new(config),
        Arc::new(Scheduler::new()),
        Arc::new(SshConnector::new()),
    );
    let http_server = HttpServer::new(state, listen_addr, metrics_path);

    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    // in-flight scrapes get a bounded grace period
    if tokio::time::timeout(SHUTDOWN_GRACE, http_task).await.is_err() {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "In-flight scrapes did not finish in time, exiting anyway"
        );
    }

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
