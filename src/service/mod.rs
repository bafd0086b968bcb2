//! Request handling for the JSON-lines front-end.
//!
//! Each request names a statement, its parameters and how to run it:
//! - `wait`: batched write, reply once its batch resolves
//! - `async`: batched write, reply as soon as it is queued
//! - `read`: query the latest committed state through the reader pool

pub mod stdio;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::engine::{Parameters, Row};
use crate::flow::completion::WriteOutcome;
use crate::server::ServerState;
use crate::writer::WriterError;

/// Maximum statement size (64 KiB).
pub const MAX_STATEMENT_SIZE: usize = 64 * 1024;

/// How a request should be executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Wait,
    Async,
    Read,
}

/// One request line.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub statement: String,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub mode: Mode,
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Applied,
    Aborted { error: String },
    Queued { request_id: String },
    Ok { rows: Vec<Row> },
    Error { error: String },
}

impl Response {
    /// Serialize to a single JSON line (without the trailing newline).
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"error","error":"failed to encode response: {e}"}}"#)
        })
    }
}

/// Parse and handle one raw request line.
pub async fn handle_line(state: &Arc<ServerState>, line: &str) -> Response {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => handle_request(state, request).await,
        Err(e) => Response::Error {
            error: format!("invalid request: {e}"),
        },
    }
}

/// Handle a parsed request.
#[tracing::instrument(skip(state, request), fields(mode = ?request.mode))]
pub async fn handle_request(state: &Arc<ServerState>, request: Request) -> Response {
    if let Err(error) = validate(&request) {
        return Response::Error { error };
    }

    let mode = request.mode;
    let (statement, parameters) = (request.statement, request.parameters);
    match mode {
        Mode::Wait => match state.writer.write(statement, parameters).await {
            Ok(WriteOutcome::Applied) => Response::Applied,
            Ok(WriteOutcome::Aborted { cause }) => Response::Aborted { error: cause },
            Err(e) => writer_error(e),
        },
        Mode::Async => match state.writer.submit_async(statement, parameters) {
            Ok(request_id) => Response::Queued { request_id },
            Err(e) => writer_error(e),
        },
        Mode::Read => {
            // Reader connections are blocking; keep them off the runtime threads
            let reader_pool = state.reader_pool.clone();
            let result = tokio::task::spawn_blocking(move || {
                reader_pool.query(&statement, &parameters)
            })
            .await;
            match result {
                Ok(Ok(rows)) => Response::Ok { rows },
                Ok(Err(e)) => Response::Error {
                    error: e.to_string(),
                },
                Err(e) => Response::Error {
                    error: format!("read task failed: {e}"),
                },
            }
        }
    }
}

fn validate(request: &Request) -> Result<(), String> {
    if request.statement.trim().is_empty() {
        return Err("statement cannot be empty".into());
    }
    if request.statement.len() > MAX_STATEMENT_SIZE {
        return Err(format!(
            "statement too large: {} bytes (max {} bytes)",
            request.statement.len(),
            MAX_STATEMENT_SIZE
        ));
    }
    if request.parameters.keys().any(String::is_empty) {
        return Err("parameter names cannot be empty".into());
    }
    Ok(())
}

fn writer_error(error: WriterError) -> Response {
    let error = match error {
        WriterError::ChannelClosed | WriterError::Abandoned => {
            "writer is shutting down".to_string()
        }
        other => other.to_string(),
    };
    Response::Error { error }
}

/// Convenience for building a parameter map from a JSON object literal.
pub fn parameters(value: Value) -> Parameters {
    match value {
        Value::Object(map) => map,
        _ => Parameters::new(),
    }
}
