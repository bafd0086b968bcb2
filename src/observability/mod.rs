//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via tracing
//! - OpenTelemetry metrics for submissions and batches

pub mod metrics;
pub mod tracing;
