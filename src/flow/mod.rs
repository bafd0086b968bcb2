//! Completion signaling between the writer and its callers.
//!
//! Provides:
//! - One-shot completion signals carrying a write outcome
//! - Batch-wide notification once a unit of work resolves

pub mod completion;
pub mod notify;
