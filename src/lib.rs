//! Batchwrite: a background batched-write coordinator.
//!
//! Callers submit individual write statements from any number of threads or
//! tasks. A dedicated writer thread drains them into bounded batches, applies
//! each batch as one atomic unit of work against a transactional data engine,
//! and signals every waiting caller once its batch has resolved.
//!
//! # Architecture
//!
//! - **Opportunistic batching**: a batch starts with the first queued request
//!   and takes whatever else is already queued, up to 100 requests
//! - **All-or-nothing**: one failing statement rolls back its whole batch
//! - **Two entry points**: wait for completion, or fire and forget
//! - **Engine-agnostic**: any store with begin/execute/commit semantics
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`engine`]: Data engine traits, SQLite engine, read pool
//! - [`flow`]: Completion signals and batch notification
//! - [`observability`]: Metrics and tracing setup
//! - [`server`]: Process wiring and lifecycle
//! - [`service`]: JSON-lines request handling
//! - [`writer`]: Pending queue, batch loop and submission handle

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // writer::WriterHandle is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::cast_possible_truncation,   // Durations in logs fit in u64
    clippy::len_without_is_empty        // Accumulators expose both anyway
)]

pub mod config;
pub mod engine;
pub mod flow;
pub mod observability;
pub mod server;
pub mod service;
pub mod writer;

use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable) request ID.
///
/// # Example
///
/// ```
/// let id = batchwrite::generate_request_id();
/// assert!(id.len() == 36); // UUID string format
/// ```
#[must_use]
pub fn generate_request_id() -> String {
    Uuid::now_v7().to_string()
}
