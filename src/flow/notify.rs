//! Completion notifier for resolved batches.
//!
//! Runs on the writer thread after a unit of work commits or rolls back.
//! Every request carrying a completion signal gets it fired exactly once with
//! the batch's outcome; fire-and-forget requests need nothing.

use super::completion::WriteOutcome;
use crate::writer::request::WriteRequest;

/// Fire the completion signal of every request in a resolved batch.
///
/// Consumes the batch, so no request can be signaled twice. Aborted batches
/// are signaled too: a waiter always learns its batch resolved, and the
/// outcome tells it how.
///
/// # Returns
///
/// The number of waiters that received the outcome.
pub fn notify_batch(batch: Vec<WriteRequest>, outcome: &WriteOutcome) -> usize {
    let mut delivered = 0;
    for request in batch {
        let id = request.id().to_string();
        if let Some(completion) = request.into_completion() {
            if completion.fire(outcome.clone()) {
                delivered += 1;
            } else {
                // Caller's wait already timed out; its write still resolved
                tracing::debug!(request_id = %id, "Completion waiter no longer listening");
            }
        }
    }
    delivered
}
