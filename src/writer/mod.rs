//! Batched writer.
//!
//! Provides:
//! - Unbounded pending queue fed by any number of submitters
//! - Dedicated writer thread draining opportunistic batches
//! - One unit of work per batch, committed or rolled back as a whole
//! - Per-request completion signals carrying the batch outcome

pub mod batch;
pub mod handle;
pub mod queue;
pub mod request;
pub mod runner;
pub mod worker;

pub use batch::{WriterConfig, MAX_BATCH_SIZE, POLL_INTERVAL, WRITE_TIMEOUT};
pub use handle::WriterHandle;
pub use request::WriteRequest;
pub use worker::{Writer, WriterPhase, WriterState};

use std::time::Duration;
use thiserror::Error;

/// Error type for writer operations.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("writer channel closed")]
    ChannelClosed,

    #[error("waited {0:?} for write to complete, giving up")]
    Timeout(Duration),

    #[error("writer dropped the request before completing it")]
    Abandoned,

    #[error("write aborted: {0}")]
    Aborted(String),

    #[error("failed to spawn writer thread: {0}")]
    Spawn(String),

    #[error("writer thread panicked")]
    ThreadPanic,
}
