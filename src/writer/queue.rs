//! Pending queue between submitters and the writer thread.
//!
//! Unbounded multi-producer, single-consumer: enqueue never blocks, and the
//! writer thread is the only consumer. Built on `std::sync::mpsc` because the
//! consumer is a plain thread that needs `recv_timeout`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use super::request::WriteRequest;

/// Create a connected sender/queue pair.
pub fn pending_queue() -> (QueueSender, PendingQueue) {
    let (tx, rx) = mpsc::channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        QueueSender {
            tx,
            depth: Arc::clone(&depth),
        },
        PendingQueue { rx, depth },
    )
}

/// Producer side of the pending queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<WriteRequest>,
    depth: Arc<AtomicUsize>,
}

impl QueueSender {
    /// Append a request in arrival order.
    ///
    /// Fails only when the consuming queue has been dropped, handing the
    /// request back.
    pub fn enqueue(&self, request: WriteRequest) -> Result<(), WriteRequest> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.tx.send(request).map_err(|e| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            e.0
        })
    }

    /// Number of requests enqueued but not yet drained by the writer.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Result of a blocking dequeue.
#[derive(Debug)]
pub enum Dequeue {
    /// A request arrived.
    Item(WriteRequest),
    /// Nothing arrived within the timeout.
    TimedOut,
    /// Every sender is gone and the queue is empty.
    Disconnected,
}

/// Consumer side of the pending queue, owned by the writer thread.
#[derive(Debug)]
pub struct PendingQueue {
    rx: mpsc::Receiver<WriteRequest>,
    depth: Arc<AtomicUsize>,
}

impl PendingQueue {
    /// Block until a request is available or `timeout` elapses.
    pub fn dequeue_wait(&self, timeout: Duration) -> Dequeue {
        match self.rx.recv_timeout(timeout) {
            Ok(request) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Dequeue::Item(request)
            }
            Err(RecvTimeoutError::Timeout) => Dequeue::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Dequeue::Disconnected,
        }
    }

    /// Take the next request if one is already queued.
    pub fn dequeue_nonblocking(&self) -> Option<WriteRequest> {
        match self.rx.try_recv() {
            Ok(request) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Some(request)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Number of requests enqueued but not yet drained.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}
