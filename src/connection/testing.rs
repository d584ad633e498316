//! A scripted connection for exercising transaction bookkeeping.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::{Connection, ConnectionError, ConnectionResult, Row, WriteResult};

struct Fault {
    pattern: String,
    error: ConnectionError,
    remaining: Option<usize>,
}

/// Records every statement and fails the ones matching an injected fault.
#[derive(Default)]
pub(crate) struct RecordingConnection {
    log: Mutex<Vec<String>>,
    faults: Mutex<Vec<Fault>>,
}

impl RecordingConnection {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail every statement containing `pattern`.
    pub(crate) fn fail_on(&self, pattern: &str, error: ConnectionError) {
        self.faults.lock().push(Fault {
            pattern: pattern.to_string(),
            error,
            remaining: None,
        });
    }

    /// Fail the next `times` statements containing `pattern`.
    pub(crate) fn fail_times(&self, pattern: &str, error: ConnectionError, times: usize) {
        self.faults.lock().push(Fault {
            pattern: pattern.to_string(),
            error,
            remaining: Some(times),
        });
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Statements starting with `prefix`, in issue order.
    pub(crate) fn statements_starting(&self, prefix: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|sql| sql.starts_with(prefix))
            .collect()
    }

    fn record(&self, sql: &str) -> ConnectionResult<()> {
        self.log.lock().push(sql.to_string());

        let mut faults = self.faults.lock();
        for fault in faults.iter_mut() {
            if !sql.contains(&fault.pattern) {
                continue;
            }
            match fault.remaining.as_mut() {
                Some(0) => continue,
                Some(n) => *n -= 1,
                None => {}
            }
            return Err(fault.error.clone());
        }
        Ok(())
    }
}

impl Connection for RecordingConnection {
    fn exec_command(&self, sql: &str) -> ConnectionResult<()> {
        self.record(sql)
    }

    fn execute(&self, sql: &str, _params: &[Value]) -> ConnectionResult<WriteResult> {
        self.record(sql)?;
        Ok(WriteResult {
            changes: 1,
            last_insert_rowid: 0,
        })
    }

    fn query_one(&self, sql: &str, _params: &[Value]) -> ConnectionResult<Option<Row>> {
        self.record(sql)?;
        Ok(None)
    }

    fn query_all(&self, sql: &str, _params: &[Value]) -> ConnectionResult<Vec<Row>> {
        self.record(sql)?;
        Ok(Vec::new())
    }
}
