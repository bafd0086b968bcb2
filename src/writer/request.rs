//! Write requests queued for the writer.

use crate::engine::Parameters;
use crate::flow::completion::Completion;
use crate::generate_request_id;

/// A statement submitted for batched application.
///
/// Immutable once created. The optional completion signal travels with the
/// request and is fired by the writer once its unit of work resolves.
#[derive(Debug)]
pub struct WriteRequest {
    id: String,
    statement: String,
    parameters: Parameters,
    completion: Option<Completion>,
}

impl WriteRequest {
    /// Create a new request with a fresh request id.
    pub fn new(
        statement: impl Into<String>,
        parameters: Parameters,
        completion: Option<Completion>,
    ) -> Self {
        Self {
            id: generate_request_id(),
            statement: statement.into(),
            parameters,
            completion,
        }
    }

    /// Time-sortable request id, used for log correlation.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Statement text.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Named statement parameters.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// True if a caller is waiting on this request.
    pub fn has_waiter(&self) -> bool {
        self.completion.is_some()
    }

    /// Consume the request, handing over its completion signal.
    pub fn into_completion(self) -> Option<Completion> {
        self.completion
    }
}
