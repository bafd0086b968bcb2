//! Submission entry points for callers.
//!
//! A [`WriterHandle`] is passed explicitly to whatever accepts writes; it is
//! cheap to clone and safe to share across threads and tasks.

use std::time::Duration;

use crate::engine::Parameters;
use crate::flow::completion::{Completion, WaitError, WriteOutcome};
use crate::observability::metrics::{record_request, record_wait_timeout};

use super::queue::QueueSender;
use super::request::WriteRequest;
use super::WriterError;

/// Handle for submitting writes to a running [`super::Writer`].
#[derive(Debug, Clone)]
pub struct WriterHandle {
    sender: QueueSender,
    write_timeout: Duration,
}

impl WriterHandle {
    pub(crate) fn new(sender: QueueSender, write_timeout: Duration) -> Self {
        Self {
            sender,
            write_timeout,
        }
    }

    /// Use a different default wait budget for this handle.
    #[must_use]
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Default wait budget for `submit_and_wait` and `write`.
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Number of requests queued but not yet picked up by the writer.
    pub fn pending(&self) -> usize {
        self.sender.depth()
    }

    /// Submit a write and block the calling thread until its batch resolves.
    ///
    /// Waits at most the handle's write timeout. Must not be called from an
    /// async context; use [`WriterHandle::write`] there.
    ///
    /// An aborted batch still returns `Ok`: inspect the [`WriteOutcome`]
    /// (or call [`WriteOutcome::into_result`]) to tell the two apart.
    pub fn submit_and_wait(
        &self,
        statement: impl Into<String>,
        parameters: Parameters,
    ) -> Result<WriteOutcome, WriterError> {
        self.submit_and_wait_timeout(statement, parameters, self.write_timeout)
    }

    /// Like [`WriterHandle::submit_and_wait`] with an explicit timeout.
    ///
    /// On timeout the request stays queued and may still be applied later.
    pub fn submit_and_wait_timeout(
        &self,
        statement: impl Into<String>,
        parameters: Parameters,
        timeout: Duration,
    ) -> Result<WriteOutcome, WriterError> {
        let (completion, waiter) = Completion::blocking();
        let request = WriteRequest::new(statement, parameters, Some(completion));
        self.enqueue(request, "wait")?;

        waiter.wait(timeout).map_err(|e| wait_error(e, timeout))
    }

    /// Submit a write and await its batch, up to the handle's write timeout.
    ///
    /// Same semantics as [`WriterHandle::submit_and_wait`] without blocking
    /// the runtime thread.
    pub async fn write(
        &self,
        statement: impl Into<String>,
        parameters: Parameters,
    ) -> Result<WriteOutcome, WriterError> {
        let (completion, waiter) = Completion::asynchronous();
        let request = WriteRequest::new(statement, parameters, Some(completion));
        self.enqueue(request, "wait")?;

        let timeout = self.write_timeout;
        waiter.wait(timeout).await.map_err(|e| wait_error(e, timeout))
    }

    /// Submit a write without waiting for it.
    ///
    /// Returns the request id immediately. Failures of the eventual batch
    /// are only visible in the writer's logs.
    pub fn submit_async(
        &self,
        statement: impl Into<String>,
        parameters: Parameters,
    ) -> Result<String, WriterError> {
        let request = WriteRequest::new(statement, parameters, None);
        let id = request.id().to_string();
        self.enqueue(request, "async")?;
        Ok(id)
    }

    fn enqueue(&self, request: WriteRequest, mode: &'static str) -> Result<(), WriterError> {
        tracing::trace!(request_id = %request.id(), mode, "Enqueueing write");
        self.sender
            .enqueue(request)
            .map_err(|_| WriterError::ChannelClosed)?;
        record_request(mode);
        Ok(())
    }
}

fn wait_error(error: WaitError, timeout: Duration) -> WriterError {
    match error {
        WaitError::TimedOut => {
            record_wait_timeout();
            WriterError::Timeout(timeout)
        }
        WaitError::Abandoned => WriterError::Abandoned,
    }
}
