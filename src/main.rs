//! Batchwrite: batched, transactional statement writer.
//!
//! # Usage
//!
//! ```bash
//! echo '{"statement":"CREATE TABLE t (v)"}' | batchwrite --data-dir ./data
//! ```
//!
//! Environment variables can also be used:
//! - `BATCHWRITE_DATA_DIR`: Data directory for SQLite
//! - `BATCHWRITE_MAX_BATCH_SIZE`: Statements per unit of work
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use batchwrite::config::Config;
use batchwrite::observability::metrics::init_metrics_with_endpoint;
use batchwrite::observability::tracing::init_tracing;
use batchwrite::server::run_server;
use std::fs;
use tokio::sync::watch;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// SIGINT (Ctrl+C) and, on unix, SIGTERM.
struct ShutdownSignals {
    #[cfg(unix)]
    sigterm: Signal,
}

impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the first shutdown signal.
    #[cfg(unix)]
    async fn recv(mut self) {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown..."),
                Err(e) => tracing::error!(error = %e, "Failed to listen for SIGINT"),
            },
            _ = self.sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }
    }

    /// Wait for the first shutdown signal.
    #[cfg(not(unix))]
    async fn recv(self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, initiating shutdown..."),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse_args();
    init_tracing(&config.log_level, config.log_json);
    init_metrics_with_endpoint(config.otel_endpoint.as_deref());

    fs::create_dir_all(&config.data_dir)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.database_path().display(),
        max_batch_size = config.max_batch_size,
        poll_interval_ms = config.poll_interval_ms,
        write_timeout_ms = config.write_timeout_ms,
        "Batchwrite starting, reading requests from stdin"
    );

    // Installed before serving: a failed install aborts startup
    let signals = ShutdownSignals::install()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        signals.recv().await;
        let _ = shutdown_tx.send(true);
    });

    run_server(config, shutdown_rx).await?;

    tracing::info!("Batchwrite stopped");
    Ok(())
}
