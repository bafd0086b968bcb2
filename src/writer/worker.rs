//! Dedicated writer thread and its lifecycle.
//!
//! The background loop is a small state machine:
//!
//! ```text
//! Idle -> WaitingForFirstItem -> Draining -> Committing -> WaitingForFirstItem ...
//!                 |
//!                 +-- running == false --> Stopping -> Terminated
//! ```
//!
//! The idle wait is bounded by the poll interval, which is what keeps
//! `stop()` responsive: the flag is re-checked at least once per interval,
//! while an in-flight drain/commit cycle is always allowed to finish.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::engine::DataEngine;
use crate::flow::completion::WriteOutcome;
use crate::flow::notify::notify_batch;
use crate::observability::metrics::record_batch;

use super::batch::{BatchAccumulator, WriterConfig};
use super::handle::WriterHandle;
use super::queue::{pending_queue, Dequeue, PendingQueue, QueueSender};
use super::request::WriteRequest;
use super::runner::apply_batch;
use super::WriterError;

/// Name given to the writer thread.
const WRITER_THREAD_NAME: &str = "batch-writer";

/// Where the writer loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WriterPhase {
    Idle = 0,
    WaitingForFirstItem = 1,
    Draining = 2,
    Committing = 3,
    Stopping = 4,
    Terminated = 5,
}

impl WriterPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::WaitingForFirstItem,
            2 => Self::Draining,
            3 => Self::Committing,
            4 => Self::Stopping,
            5 => Self::Terminated,
            _ => Self::Idle,
        }
    }
}

/// Lock-free state shared between the controlling thread and the loop.
#[derive(Debug)]
pub struct WriterState {
    running: AtomicBool,
    phase: AtomicU8,
}

impl Default for WriterState {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterState {
    /// Create a stopped, idle state.
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            phase: AtomicU8::new(WriterPhase::Idle as u8),
        }
    }

    /// Whether the loop has been asked to keep running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current loop phase.
    pub fn phase(&self) -> WriterPhase {
        WriterPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    fn set_phase(&self, phase: WriterPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }
}

/// The batched writer.
///
/// Owns the data engine and the consuming end of the pending queue. While
/// running, both live on the writer thread; while stopped they are parked
/// here so the writer can be started again.
pub struct Writer<E: DataEngine> {
    state: Arc<WriterState>,
    sender: QueueSender,
    config: WriterConfig,
    parked: Option<(E, PendingQueue)>,
    worker: Option<JoinHandle<(E, PendingQueue)>>,
}

impl<E: DataEngine> Writer<E> {
    /// Create a stopped writer around `engine`.
    ///
    /// Requests may be submitted through [`Writer::handle`] before
    /// [`Writer::start`]; they wait in the queue.
    pub fn new(engine: E, config: WriterConfig) -> Self {
        let (sender, queue) = pending_queue();
        Self {
            state: Arc::new(WriterState::new()),
            sender,
            config,
            parked: Some((engine, queue)),
            worker: None,
        }
    }

    /// Create a writer and start its thread.
    pub fn spawn(engine: E, config: WriterConfig) -> Result<Self, WriterError> {
        let mut writer = Self::new(engine, config);
        writer.start()?;
        Ok(writer)
    }

    /// Get a submission handle.
    pub fn handle(&self) -> WriterHandle {
        WriterHandle::new(self.sender.clone(), self.config.write_timeout)
    }

    /// Shared lifecycle state.
    pub fn state(&self) -> &WriterState {
        &self.state
    }

    /// Whether the writer has been started and not stopped.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Start the writer thread. No-op if already running.
    ///
    /// After a [`Writer::stop`], this first joins the previous thread, which
    /// takes at most one poll interval plus any in-flight batch.
    pub fn start(&mut self) -> Result<(), WriterError> {
        if self.state.is_running() {
            return Ok(());
        }
        if self.worker.is_some() {
            self.join()?;
        }

        let (mut engine, queue) = self.parked.take().ok_or(WriterError::ThreadPanic)?;
        let state = Arc::clone(&self.state);
        let config = self.config;

        self.state.set_running(true);
        self.state.set_phase(WriterPhase::Idle);

        let spawned = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || {
                run_loop(&mut engine, &queue, config, &state);
                (engine, queue)
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                tracing::info!(
                    max_batch_size = config.max_batch_size,
                    poll_interval_ms = config.poll_interval.as_millis() as u64,
                    "Writer started"
                );
                Ok(())
            }
            Err(e) => {
                self.state.set_running(false);
                Err(WriterError::Spawn(e.to_string()))
            }
        }
    }

    /// Ask the writer thread to stop. Idempotent.
    ///
    /// Does not interrupt an in-flight batch and does not wait; use
    /// [`Writer::join`] or [`Writer::shutdown`] to wait for termination.
    pub fn stop(&self) {
        if self.state.is_running() {
            tracing::info!(pending = self.sender.depth(), "Stopping writer");
        }
        self.state.set_running(false);
    }

    /// Wait for the writer thread to terminate.
    ///
    /// Only returns once the loop has observed a [`Writer::stop`], or once
    /// every queue sender is gone.
    pub fn join(&mut self) -> Result<(), WriterError> {
        if let Some(handle) = self.worker.take() {
            let parts = handle.join().map_err(|_| WriterError::ThreadPanic)?;
            self.parked = Some(parts);
        }
        Ok(())
    }

    /// Stop, join, and hand back the engine.
    ///
    /// Requests still queued are dropped with the writer; their waiters
    /// observe [`WriterError::Abandoned`].
    pub fn shutdown(mut self) -> Result<E, WriterError> {
        self.stop();
        self.join()?;
        let (engine, _queue) = self.parked.take().ok_or(WriterError::ThreadPanic)?;
        Ok(engine)
    }
}

impl<E: DataEngine> Drop for Writer<E> {
    fn drop(&mut self) {
        // Thread exits on its own within a poll interval
        self.state.set_running(false);
    }
}

/// The writer loop. Returns once `running` is observed false.
fn run_loop<E: DataEngine>(
    engine: &mut E,
    queue: &PendingQueue,
    config: WriterConfig,
    state: &WriterState,
) {
    let mut batch = BatchAccumulator::new(config.max_batch_size);

    while state.is_running() {
        state.set_phase(WriterPhase::WaitingForFirstItem);
        let first = match queue.dequeue_wait(config.poll_interval) {
            Dequeue::Item(request) => request,
            Dequeue::TimedOut => continue,
            Dequeue::Disconnected => {
                tracing::info!("All submission handles dropped, writer exiting");
                break;
            }
        };

        state.set_phase(WriterPhase::Draining);
        batch.push(first);
        batch.fill_from(|| queue.dequeue_nonblocking());

        state.set_phase(WriterPhase::Committing);
        run_cycle(engine, batch.drain());
    }

    state.set_phase(WriterPhase::Stopping);
    tracing::info!(pending = queue.depth(), "Writer stopped");
    state.set_phase(WriterPhase::Terminated);
}

/// Apply one batch, then signal every waiter in it.
///
/// A panic inside the engine is contained here: the unit of work is rolled
/// back by unwinding, the batch is reported aborted, and the loop goes on.
fn run_cycle<E: DataEngine>(engine: &mut E, requests: Vec<WriteRequest>) {
    let size = requests.len();
    let started = Instant::now();

    let result = panic::catch_unwind(AssertUnwindSafe(|| apply_batch(engine, &requests)));
    let elapsed = started.elapsed();

    let outcome = match result {
        Ok(Ok(())) => {
            tracing::debug!(
                batch_size = size,
                elapsed_us = elapsed.as_micros() as u64,
                "Batch committed"
            );
            WriteOutcome::Applied
        }
        Ok(Err(e)) => {
            tracing::warn!(batch_size = size, error = %e, "Batch aborted");
            WriteOutcome::Aborted {
                cause: e.to_string(),
            }
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                batch_size = size,
                panic = %message,
                "Writer caught panic while applying batch"
            );
            WriteOutcome::Aborted {
                cause: format!("writer panicked: {message}"),
            }
        }
    };

    record_batch(size, elapsed.as_secs_f64(), outcome.is_applied());
    notify_batch(requests, &outcome);
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
