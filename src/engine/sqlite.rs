//! SQLite-backed data engine.
//!
//! One read/write connection owned by the writer thread. Statements run
//! inside IMMEDIATE transactions so a batch takes the write lock up front.
//! Reader connections (see [`super::reader`]) see a batch only once it commits.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, Statement, Transaction, TransactionBehavior};
use serde_json::{Number, Value};
use std::path::Path;
use std::time::Duration;

use super::{DataEngine, EngineError, Parameters, Row, UnitOfWork};

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Prefixes SQLite accepts for named parameters.
const PARAMETER_PREFIXES: [char; 3] = [':', '@', '$'];

/// Apply pragmas for the writer connection.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL")?;
    conn.execute_batch("PRAGMA synchronous = FULL")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

/// Apply pragmas for read-only connections.
pub fn apply_reader_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA query_only = ON")?;
    Ok(())
}

/// SQLite data engine.
#[derive(Debug)]
pub struct SqliteEngine {
    conn: Connection,
}

impl SqliteEngine {
    /// Open (or create) the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let conn = Connection::open(path).map_err(|e| EngineError::Begin(e.to_string()))?;
        apply_pragmas(&conn).map_err(|e| EngineError::Begin(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory().map_err(|e| EngineError::Begin(e.to_string()))?;
        apply_pragmas(&conn).map_err(|e| EngineError::Begin(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Run a statement outside of any unit of work.
    ///
    /// Useful for bootstrapping schema before the writer starts.
    pub fn execute(
        &self,
        statement: &str,
        parameters: &Parameters,
    ) -> Result<Vec<Row>, EngineError> {
        run_statement(&self.conn, statement, parameters)
    }

    /// Borrow the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl DataEngine for SqliteEngine {
    type Unit<'a> = SqliteUnit<'a>;

    fn begin(&mut self) -> Result<SqliteUnit<'_>, EngineError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| EngineError::Begin(e.to_string()))?;
        Ok(SqliteUnit { tx })
    }
}

/// An open SQLite transaction. Rolls back on drop unless committed.
pub struct SqliteUnit<'a> {
    tx: Transaction<'a>,
}

impl UnitOfWork for SqliteUnit<'_> {
    fn execute(
        &mut self,
        statement: &str,
        parameters: &Parameters,
    ) -> Result<Vec<Row>, EngineError> {
        run_statement(&self.tx, statement, parameters)
    }

    fn commit(self) -> Result<(), EngineError> {
        self.tx
            .commit()
            .map_err(|e| EngineError::Commit(e.to_string()))
    }

    fn rollback(self) -> Result<(), EngineError> {
        self.tx
            .rollback()
            .map_err(|e| EngineError::Rollback(e.to_string()))
    }
}

/// Prepare, bind and step a statement, collecting every produced row.
pub(crate) fn run_statement(
    conn: &Connection,
    statement: &str,
    parameters: &Parameters,
) -> Result<Vec<Row>, EngineError> {
    let mut stmt = conn
        .prepare_cached(statement)
        .map_err(|e| EngineError::Statement(e.to_string()))?;
    bind_parameters(&mut stmt, parameters)?;

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| EngineError::Statement(e.to_string()))?
    {
        let mut mapped = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            let value = row
                .get_ref(idx)
                .map_err(|e| EngineError::Statement(e.to_string()))?;
            mapped.insert(name.clone(), from_sql(value));
        }
        out.push(mapped);
    }
    Ok(out)
}

/// Bind every entry of `parameters` to the statement by name.
///
/// Every parameter the statement references must be supplied; SQLite would
/// otherwise read the unbound slot as NULL.
fn bind_parameters(stmt: &mut Statement<'_>, parameters: &Parameters) -> Result<(), EngineError> {
    let mut bound = vec![false; stmt.parameter_count()];

    for (name, value) in parameters {
        let idx = parameter_index(stmt, name)?.ok_or_else(|| EngineError::Parameter {
            name: name.clone(),
            reason: "not referenced by statement".into(),
        })?;
        let value = to_sql(value).map_err(|reason| EngineError::Parameter {
            name: name.clone(),
            reason,
        })?;
        stmt.raw_bind_parameter(idx, value)
            .map_err(|e| EngineError::Parameter {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        if let Some(slot) = bound.get_mut(idx - 1) {
            *slot = true;
        }
    }

    if let Some(missing) = bound.iter().position(|slot| !slot) {
        let name = stmt.parameter_name(missing + 1).unwrap_or("?").to_string();
        return Err(EngineError::Parameter {
            name,
            reason: "referenced by statement but not supplied".into(),
        });
    }
    Ok(())
}

/// Resolve a parameter name to its 1-based index, trying each SQLite prefix.
fn parameter_index(stmt: &Statement<'_>, name: &str) -> Result<Option<usize>, EngineError> {
    let lookup = |candidate: &str| {
        stmt.parameter_index(candidate)
            .map_err(|e| EngineError::Parameter {
                name: name.to_string(),
                reason: e.to_string(),
            })
    };

    if name.starts_with(PARAMETER_PREFIXES) {
        return lookup(name);
    }
    for prefix in PARAMETER_PREFIXES {
        if let Some(idx) = lookup(&format!("{prefix}{name}"))? {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}

/// Convert a JSON parameter into a SQLite value.
fn to_sql(value: &Value) -> Result<SqlValue, String> {
    let value = match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => SqlValue::Integer(i),
            (None, Some(u)) => return Err(format!("integer {u} does not fit in 64 bits")),
            (None, None) => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        // Nested values are stored as their JSON text
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    };
    Ok(value)
}

/// Convert a SQLite column value into JSON.
fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}
