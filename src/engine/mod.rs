//! Data engine abstraction for the batched writer.
//!
//! The writer only needs transactional "begin / execute / commit" semantics
//! from whatever store sits behind it:
//! - [`DataEngine`]: opens a unit of work
//! - [`UnitOfWork`]: executes statements, then commits or rolls back
//! - [`sqlite`]: the bundled SQLite engine
//! - [`reader`]: pooled read-only access for queries outside the writer

pub mod reader;
pub mod sqlite;

use thiserror::Error;

/// Named statement parameters, keyed by parameter name.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// A single result row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Error type for data engine operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("failed to begin unit of work: {0}")]
    Begin(String),

    #[error("statement failed: {0}")]
    Statement(String),

    #[error("invalid parameter `{name}`: {reason}")]
    Parameter { name: String, reason: String },

    #[error("failed to commit unit of work: {0}")]
    Commit(String),

    #[error("failed to roll back unit of work: {0}")]
    Rollback(String),
}

/// A transactional store the writer can apply batches against.
///
/// The writer thread owns the engine exclusively, so implementations do not
/// need interior synchronization. Isolation between concurrent units of work
/// opened elsewhere (other processes, reader connections) is the engine's
/// own responsibility.
pub trait DataEngine: Send + 'static {
    /// An open unit of work borrowing the engine.
    type Unit<'a>: UnitOfWork
    where
        Self: 'a;

    /// Open a new atomic unit of work.
    fn begin(&mut self) -> Result<Self::Unit<'_>, EngineError>;
}

/// One atomic, all-or-nothing unit of work.
///
/// Dropping a unit without calling [`UnitOfWork::commit`] must discard
/// everything executed through it.
pub trait UnitOfWork {
    /// Execute a statement inside this unit, returning any produced rows.
    fn execute(&mut self, statement: &str, parameters: &Parameters)
        -> Result<Vec<Row>, EngineError>;

    /// Durably commit everything executed through this unit.
    fn commit(self) -> Result<(), EngineError>;

    /// Discard everything executed through this unit.
    fn rollback(self) -> Result<(), EngineError>;
}
