//! Applies one batch as a single unit of work.

use crate::engine::{DataEngine, EngineError, UnitOfWork};

use super::request::WriteRequest;

/// Apply every request of `batch`, in order, inside one unit of work.
///
/// Commits if every statement succeeds. The first failing statement rolls
/// the whole unit back and its error is returned: the batch fails together,
/// with no per-statement isolation or retry.
pub fn apply_batch<E: DataEngine>(
    engine: &mut E,
    batch: &[WriteRequest],
) -> Result<(), EngineError> {
    let mut unit = engine.begin()?;

    for (index, request) in batch.iter().enumerate() {
        if let Err(e) = unit.execute(request.statement(), request.parameters()) {
            tracing::warn!(
                request_id = %request.id(),
                index,
                batch_size = batch.len(),
                error = %e,
                "Statement failed, rolling back batch"
            );
            if let Err(rollback_err) = unit.rollback() {
                tracing::error!(error = %rollback_err, "Rollback failed");
            }
            return Err(e);
        }
    }

    unit.commit()
}
