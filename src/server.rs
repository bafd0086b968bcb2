//! Process wiring and lifecycle.
//!
//! Opens the engine, starts the writer thread, serves requests on
//! stdin/stdout, and stops the writer once input ends or shutdown is
//! signaled.

use anyhow::Context;
use std::io::BufReader;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::watch;

use crate::config::Config;
use crate::engine::reader::ReaderPool;
use crate::engine::sqlite::SqliteEngine;
use crate::service::stdio;
use crate::writer::{Writer, WriterHandle};

/// Server state shared across handlers.
pub struct ServerState {
    pub writer: WriterHandle,
    pub reader_pool: ReaderPool,
}

/// Run Batchwrite until stdin closes or shutdown is signaled.
///
/// # Arguments
///
/// * `config` - Server configuration
/// * `shutdown_rx` - Receiver for shutdown signal
pub async fn run_server(config: Config, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
    let lines = stdio::read_lines(BufReader::new(std::io::stdin()))
        .context("failed to start stdin reader")?;
    run_server_with(config, lines, tokio::io::stdout(), shutdown_rx).await
}

/// Run Batchwrite against an arbitrary line source and response sink.
///
/// Returns once `lines` ends or shutdown is signaled, after the writer
/// thread has been stopped and joined.
pub async fn run_server_with<W>(
    config: Config,
    lines: stdio::Lines,
    output: W,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let db_path = config.database_path();

    // Writer engine creates the database file; readers need it to exist
    let engine = SqliteEngine::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    let writer = Writer::spawn(engine, config.writer_config())?;

    let reader_pool = ReaderPool::new(&db_path, config.reader_pool_size)
        .context("failed to create reader pool")?;

    let state = Arc::new(ServerState {
        writer: writer.handle(),
        reader_pool,
    });

    tracing::info!(database = %db_path.display(), "Serving statements");

    let served = stdio::serve(Arc::clone(&state), lines, output, shutdown_rx).await;

    // Shutdown writer, even if serving failed
    tracing::info!(pending = state.writer.pending(), "Shutting down writer thread");
    tokio::task::spawn_blocking(move || writer.shutdown()).await??;

    let handled = served.context("failed to serve requests")?;
    tracing::info!(handled, "Server stopped");
    Ok(())
}
