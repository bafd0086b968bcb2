//! Test utilities for Batchwrite integration tests.
//!
//! Provides:
//! - Temporary database fixtures
//! - A recording in-memory data engine
//! - Polling helpers
//! - Input that stays open until the test closes it

#![allow(dead_code)]

use batchwrite::engine::{DataEngine, EngineError, Parameters, Row, UnitOfWork};
use std::io::Read;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with a temporary database directory.
    pub fn new() -> Self {
        batchwrite::observability::tracing::init_test_tracing();
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        Self { temp_dir, db_path }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a [`MemoryEngine`] has seen.
#[derive(Debug, Default)]
pub struct EngineLog {
    /// Statements of committed units, in commit order
    pub committed: Vec<String>,
    /// Number of units of work opened
    pub units_opened: usize,
    /// Statements executed per unit, in open order
    pub unit_sizes: Vec<usize>,
    /// Number of commits
    pub commits: usize,
    /// Number of rollbacks, explicit or by drop
    pub rollbacks: usize,
}

#[derive(Debug, Default)]
struct EngineInner {
    log: EngineLog,
    fail_marker: Option<String>,
    execute_delay: Option<Duration>,
    fail_begin: bool,
}

/// In-memory engine recording every unit of work.
///
/// Clones share the same log, so a test keeps one clone while the writer
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<Mutex<EngineInner>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement containing `marker`.
    pub fn failing_on(marker: &str) -> Self {
        let engine = Self::new();
        engine.lock().fail_marker = Some(marker.to_string());
        engine
    }

    /// Sleep this long inside every execute.
    pub fn with_execute_delay(self, delay: Duration) -> Self {
        self.lock().execute_delay = Some(delay);
        self
    }

    /// Make `begin` fail (or succeed again).
    pub fn set_fail_begin(&self, fail: bool) {
        self.lock().fail_begin = fail;
    }

    pub fn committed(&self) -> Vec<String> {
        self.lock().log.committed.clone()
    }

    pub fn units_opened(&self) -> usize {
        self.lock().log.units_opened
    }

    pub fn unit_sizes(&self) -> Vec<usize> {
        self.lock().log.unit_sizes.clone()
    }

    pub fn commits(&self) -> usize {
        self.lock().log.commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().log.rollbacks
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().expect("engine log poisoned")
    }
}

/// An open unit of a [`MemoryEngine`].
pub struct MemoryUnit<'a> {
    engine: &'a MemoryEngine,
    slot: usize,
    staged: Vec<String>,
    resolved: bool,
}

impl DataEngine for MemoryEngine {
    type Unit<'a> = MemoryUnit<'a>;

    fn begin(&mut self) -> Result<MemoryUnit<'_>, EngineError> {
        let mut inner = self.lock();
        if inner.fail_begin {
            return Err(EngineError::Begin("engine unavailable".into()));
        }
        inner.log.units_opened += 1;
        inner.log.unit_sizes.push(0);
        let slot = inner.log.unit_sizes.len() - 1;
        drop(inner);

        Ok(MemoryUnit {
            engine: self,
            slot,
            staged: Vec::new(),
            resolved: false,
        })
    }
}

impl UnitOfWork for MemoryUnit<'_> {
    fn execute(
        &mut self,
        statement: &str,
        _parameters: &Parameters,
    ) -> Result<Vec<Row>, EngineError> {
        let (delay, fail) = {
            let mut inner = self.engine.lock();
            inner.log.unit_sizes[self.slot] += 1;
            let fail = inner
                .fail_marker
                .as_deref()
                .is_some_and(|marker| statement.contains(marker));
            (inner.execute_delay, fail)
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if fail {
            return Err(EngineError::Statement(format!("rejected: {statement}")));
        }
        self.staged.push(statement.to_string());
        Ok(Vec::new())
    }

    fn commit(mut self) -> Result<(), EngineError> {
        let mut inner = self.engine.lock();
        inner.log.committed.append(&mut self.staged);
        inner.log.commits += 1;
        drop(inner);
        self.resolved = true;
        Ok(())
    }

    fn rollback(mut self) -> Result<(), EngineError> {
        self.engine.lock().log.rollbacks += 1;
        self.resolved = true;
        Ok(())
    }
}

impl Drop for MemoryUnit<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            if let Ok(mut inner) = self.engine.inner.lock() {
                inner.log.rollbacks += 1;
            }
        }
    }
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Build a parameter map from a JSON object literal.
pub fn params(value: serde_json::Value) -> Parameters {
    value.as_object().cloned().unwrap_or_default()
}

/// Blocking input that stays open until its [`InputFeed`] is dropped.
///
/// Reads park like a terminal or pipe with nothing to say.
pub struct HeldOpenInput {
    chunks: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

/// Writing side of a [`HeldOpenInput`].
pub struct InputFeed {
    tx: mpsc::Sender<Vec<u8>>,
}

impl InputFeed {
    /// Make one line available to the reader.
    pub fn send_line(&self, line: &str) {
        let mut chunk = line.as_bytes().to_vec();
        chunk.push(b'\n');
        self.tx.send(chunk).expect("input reader gone");
    }
}

/// Create a held-open input and its feed.
pub fn held_open_input() -> (InputFeed, std::io::BufReader<HeldOpenInput>) {
    let (tx, chunks) = mpsc::channel();
    let input = HeldOpenInput {
        chunks,
        pending: Vec::new(),
    };
    (InputFeed { tx }, std::io::BufReader::new(input))
}

impl Read for HeldOpenInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pending.is_empty() {
            match self.chunks.recv() {
                Ok(chunk) => self.pending = chunk,
                // Feed dropped: EOF
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}
