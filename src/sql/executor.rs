//! Statement execution with builder conveniences layered on top.

use serde_json::Value;

use crate::connection::{Row, WriteResult};
use crate::sql::builder;
use crate::transaction::TransactionResult;

/// Something that can run statements: a transaction handle, typically.
///
/// Only the three raw operations are required; the CRUD helpers format
/// their statement with the [`builder`](crate::sql) functions and forward it.
pub trait Executor {
    /// Run a write statement with positional parameters.
    fn execute(&self, sql: &str, params: &[Value]) -> TransactionResult<WriteResult>;

    /// Run a query and return its first row, if any.
    fn query_one(&self, sql: &str, params: &[Value]) -> TransactionResult<Option<Row>>;

    /// Run a query and return every row.
    fn query_all(&self, sql: &str, params: &[Value]) -> TransactionResult<Vec<Row>>;

    /// Insert one row.
    fn insert(&self, table: &str, values: &Row) -> TransactionResult<WriteResult> {
        let stmt = builder::insert(table, values)?;
        self.execute(&stmt.sql, &stmt.params)
    }

    /// Update the rows matching every `filter` column.
    fn update(&self, table: &str, set: &Row, filter: &Row) -> TransactionResult<WriteResult> {
        let stmt = builder::update(table, set, filter)?;
        self.execute(&stmt.sql, &stmt.params)
    }

    /// Delete the rows matching every `filter` column.
    fn delete(&self, table: &str, filter: &Row) -> TransactionResult<WriteResult> {
        let stmt = builder::delete(table, filter)?;
        self.execute(&stmt.sql, &stmt.params)
    }

    /// Select the rows matching every `filter` column.
    fn select(&self, table: &str, filter: &Row) -> TransactionResult<Vec<Row>> {
        let stmt = builder::select(table, filter)?;
        self.query_all(&stmt.sql, &stmt.params)
    }

    /// Select the first row matching every `filter` column.
    fn select_one(&self, table: &str, filter: &Row) -> TransactionResult<Option<Row>> {
        let stmt = builder::select(table, filter)?;
        self.query_one(&stmt.sql, &stmt.params)
    }
}
