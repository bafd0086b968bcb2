//! One-shot completion signals for submitted writes.
//!
//! A submitter keeps the waiting half, the writer keeps the [`Completion`]
//! half. Firing consumes the `Completion`, so a signal can fire at most once.
//! Two flavors exist so blocking callers never need a runtime and async
//! callers never park a thread:
//! - [`BlockingWaiter`]: `std::sync::mpsc` rendezvous with `recv_timeout`
//! - [`AsyncWaiter`]: `tokio::sync::oneshot` raced against `tokio::time::timeout`

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Result of the unit of work a request was applied in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The unit of work containing the request committed.
    Applied,
    /// The unit of work containing the request rolled back.
    Aborted { cause: String },
}

impl WriteOutcome {
    /// True if the request's unit of work committed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Turn an aborted outcome into an error.
    pub fn into_result(self) -> Result<(), crate::writer::WriterError> {
        match self {
            Self::Applied => Ok(()),
            Self::Aborted { cause } => Err(crate::writer::WriterError::Aborted(cause)),
        }
    }
}

/// Why waiting on a completion signal ended without an outcome.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("timed out waiting for completion")]
    TimedOut,

    #[error("completion signal dropped without firing")]
    Abandoned,
}

/// Trigger half of a completion signal, owned by the writer.
#[derive(Debug)]
pub struct Completion {
    sender: CompletionSender,
}

#[derive(Debug)]
enum CompletionSender {
    Blocking(mpsc::SyncSender<WriteOutcome>),
    Async(oneshot::Sender<WriteOutcome>),
}

impl Completion {
    /// Create a signal whose waiter blocks the calling thread.
    pub fn blocking() -> (Self, BlockingWaiter) {
        let (tx, rx) = mpsc::sync_channel(1);
        (
            Self {
                sender: CompletionSender::Blocking(tx),
            },
            BlockingWaiter { rx },
        )
    }

    /// Create a signal whose waiter is awaited.
    pub fn asynchronous() -> (Self, AsyncWaiter) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: CompletionSender::Async(tx),
            },
            AsyncWaiter { rx },
        )
    }

    /// Fire the signal.
    ///
    /// Returns false if the waiter already gave up (timed out or dropped).
    pub fn fire(self, outcome: WriteOutcome) -> bool {
        match self.sender {
            // Capacity 1 and a single send, so this never sees `Full`
            CompletionSender::Blocking(tx) => tx.try_send(outcome).is_ok(),
            CompletionSender::Async(tx) => tx.send(outcome).is_ok(),
        }
    }
}

/// Waiting half for blocking callers.
#[derive(Debug)]
pub struct BlockingWaiter {
    rx: mpsc::Receiver<WriteOutcome>,
}

impl BlockingWaiter {
    /// Block until the signal fires or `timeout` elapses.
    pub fn wait(self, timeout: Duration) -> Result<WriteOutcome, WaitError> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Ok(outcome),
            Err(RecvTimeoutError::Timeout) => Err(WaitError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(WaitError::Abandoned),
        }
    }
}

/// Waiting half for async callers.
#[derive(Debug)]
pub struct AsyncWaiter {
    rx: oneshot::Receiver<WriteOutcome>,
}

impl AsyncWaiter {
    /// Wait until the signal fires or `timeout` elapses.
    pub async fn wait(self, timeout: Duration) -> Result<WriteOutcome, WaitError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(WaitError::Abandoned),
            Err(_) => Err(WaitError::TimedOut),
        }
    }
}
