//! Line-oriented front-end.
//!
//! Reads one JSON request per line and writes one JSON response per line,
//! in request order, until EOF or a shutdown signal.
//!
//! Input is read on a dedicated OS thread feeding a channel. A blocking read
//! there never holds up shutdown: the serve loop stops on the signal and the
//! process may exit with the read still parked.

use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use super::handle_line;
use crate::server::ServerState;

/// Lines buffered between the reader thread and the serve loop.
const LINE_CHANNEL_SIZE: usize = 64;

/// Name given to the input reader thread.
const READER_THREAD_NAME: &str = "stdin-reader";

/// Receiving end of a line reader.
pub type Lines = mpsc::Receiver<std::io::Result<String>>;

/// Read `input` line by line on a dedicated thread.
///
/// The thread ends at EOF, after the first read error (which is forwarded),
/// or once the returned receiver is dropped and another line arrives.
pub fn read_lines<R>(input: R) -> std::io::Result<Lines>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_CHANNEL_SIZE);

    thread::Builder::new()
        .name(READER_THREAD_NAME.to_string())
        .spawn(move || {
            for line in input.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;

    Ok(rx)
}

/// Serve requests from `lines`, writing responses to `output`.
///
/// # Returns
///
/// The number of requests handled.
pub async fn serve<W>(
    state: Arc<ServerState>,
    mut lines: Lines,
    mut output: W,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut handled = 0;

    loop {
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = shutdown_rx.changed() => {
                tracing::info!("Shutdown signal received, no longer reading requests");
                break;
            }
        };

        let Some(line) = line else {
            tracing::debug!("Input closed");
            break;
        };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(&state, &line).await;
        output.write_all(response.to_line().as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
        handled += 1;
    }

    Ok(handled)
}
