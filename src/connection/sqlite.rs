//! SQLite binding for the [`Connection`] boundary.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, ErrorCode};
use serde_json::{Number, Value};

use super::{Connection, ConnectionError, ConnectionResult, Row, WriteResult};

/// A single SQLite handle shared by every caller.
///
/// The handle is guarded by a mutex only to make it `Sync`; statement
/// ordering across logical transactions is enforced by the serialization
/// queue, not here.
pub struct SqliteConnection {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteConnection {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> ConnectionResult<Self> {
        let conn = rusqlite::Connection::open(path.as_ref())
            .map_err(|e| ConnectionError::Open(format!("{}: {}", path.as_ref().display(), e)))?;
        Ok(Self::from_raw(conn))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> ConnectionResult<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| ConnectionError::Open(e.to_string()))?;
        Ok(Self::from_raw(conn))
    }

    /// Wrap an already opened rusqlite connection.
    pub fn from_raw(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Whether the handle is outside any transaction.
    pub fn is_autocommit(&self) -> bool {
        self.conn.lock().is_autocommit()
    }
}

impl Connection for SqliteConnection {
    fn exec_command(&self, sql: &str) -> ConnectionResult<()> {
        self.conn.lock().execute_batch(sql).map_err(classify)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> ConnectionResult<WriteResult> {
        let params = bind(params)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(classify)?;
        let changes = stmt
            .execute(params_from_iter(params))
            .map_err(classify)?;
        Ok(WriteResult {
            changes: changes as u64,
            last_insert_rowid: conn.last_insert_rowid(),
        })
    }

    fn query_one(&self, sql: &str, params: &[Value]) -> ConnectionResult<Option<Row>> {
        Ok(self.query(sql, params, Some(1))?.into_iter().next())
    }

    fn query_all(&self, sql: &str, params: &[Value]) -> ConnectionResult<Vec<Row>> {
        self.query(sql, params, None)
    }
}

impl SqliteConnection {
    fn query(&self, sql: &str, params: &[Value], limit: Option<usize>) -> ConnectionResult<Vec<Row>> {
        let params = bind(params)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(classify)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt
            .query(params_from_iter(params))
            .map_err(classify)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(classify)? {
            let mut record = Row::new();
            for (i, column) in columns.iter().enumerate() {
                let cell = row.get_ref(i).map_err(classify)?;
                record.insert(column.clone(), from_sql(cell));
            }
            out.push(record);
            if limit.is_some_and(|n| out.len() >= n) {
                break;
            }
        }
        Ok(out)
    }
}

/// Map a rusqlite failure onto the boundary's error classes.
fn classify(e: rusqlite::Error) -> ConnectionError {
    let message = e.to_string();
    match &e {
        rusqlite::Error::SqliteFailure(err, _) => match err.code {
            ErrorCode::DatabaseBusy => ConnectionError::Busy(message),
            ErrorCode::DatabaseLocked => ConnectionError::Locked(message),
            ErrorCode::ConstraintViolation => ConnectionError::Constraint(message),
            ErrorCode::TypeMismatch => ConnectionError::Type(message),
            _ => ConnectionError::Statement(message),
        },
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::ToSqlConversionFailure(..) => ConnectionError::Type(message),
        _ => ConnectionError::Statement(message),
    }
}

fn bind(params: &[Value]) -> ConnectionResult<Vec<SqlValue>> {
    params.iter().map(to_sql).collect()
}

fn to_sql(value: &Value) -> ConnectionResult<SqlValue> {
    let bound = match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None if n.is_u64() => {
                return Err(ConnectionError::Type(format!(
                    "integer parameter {} is out of range for a 64-bit signed column",
                    n
                )))
            }
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        // nested structures are stored as their JSON text
        other => SqlValue::Text(other.to_string()),
    };
    Ok(bound)
}

fn from_sql(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}
