//! Opportunistic batch assembly.
//!
//! A batch starts as soon as one request arrives and grows only while more
//! requests are already queued at that instant:
//! - Never waits to accumulate more work
//! - Capped at `max_batch_size` (first request included)
//! - Transient: drained into one unit of work and discarded

use std::time::Duration;

/// Default maximum number of requests applied in one unit of work.
pub const MAX_BATCH_SIZE: usize = 100;

/// Default wait for a first request before re-checking the running flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default time a synchronous caller waits for its write.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    /// Maximum number of requests in a batch
    pub max_batch_size: usize,
    /// Longest the idle writer waits before re-checking for shutdown
    pub poll_interval: Duration,
    /// Default wait budget for `submit_and_wait` callers
    pub write_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
            poll_interval: POLL_INTERVAL,
            write_timeout: WRITE_TIMEOUT,
        }
    }
}

impl WriterConfig {
    /// Create a WriterConfig from application config values.
    ///
    /// A batch size of 0 is clamped to 1.
    pub fn from_config(batch_size: usize, poll_interval_ms: u64, write_timeout_ms: u64) -> Self {
        Self {
            max_batch_size: batch_size.max(1),
            poll_interval: Duration::from_millis(poll_interval_ms),
            write_timeout: Duration::from_millis(write_timeout_ms),
        }
    }

    /// Create a test config with a short poll interval.
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
            poll_interval: Duration::from_millis(20),
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Batch accumulator for queued requests.
///
/// Collects items until the batch is full or the source runs dry.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    max_batch_size: usize,
    items: Vec<T>,
}

impl<T> BatchAccumulator<T> {
    /// Create a new accumulator holding at most `max_batch_size` items.
    pub fn new(max_batch_size: usize) -> Self {
        let max_batch_size = max_batch_size.max(1);
        Self {
            max_batch_size,
            items: Vec::with_capacity(max_batch_size),
        }
    }

    /// Add an item to the batch.
    ///
    /// Returns true if the batch is now full.
    pub fn push(&mut self, item: T) -> bool {
        debug_assert!(!self.is_full(), "push into a full batch");
        self.items.push(item);
        self.is_full()
    }

    /// Pull items from `next` until the batch is full or `next` yields `None`.
    ///
    /// Returns the number of items pulled.
    pub fn fill_from<F>(&mut self, mut next: F) -> usize
    where
        F: FnMut() -> Option<T>,
    {
        let mut pulled = 0;
        while !self.is_full() {
            match next() {
                Some(item) => {
                    self.items.push(item);
                    pulled += 1;
                }
                None => break,
            }
        }
        pulled
    }

    /// Check if the batch has reached its size cap.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_batch_size
    }

    /// Drain the batch, returning all accumulated items.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::replace(&mut self.items, Vec::with_capacity(self.max_batch_size))
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the current batch size.
    pub fn len(&self) -> usize {
        self.items.len()
    }
}
