//! INSERT / UPDATE / DELETE / SELECT builders.

use serde_json::Value;

use crate::connection::Row;
use crate::sql::error::{SqlError, SqlResult};

/// A statement ready for execution: SQL text plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Double-quote an identifier, doubling any embedded quote.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn table_ident(table: &str) -> SqlResult<String> {
    if table.trim().is_empty() {
        return Err(SqlError::InvalidIdentifier(table.to_string()));
    }
    Ok(quote_ident(table))
}

/// Append ` WHERE "a" = ? AND "b" = ?` for a non-empty filter.
fn push_where(sql: &mut String, params: &mut Vec<Value>, filter: &Row) {
    if filter.is_empty() {
        return;
    }
    let conditions: Vec<String> = filter
        .iter()
        .map(|(column, value)| {
            params.push(value.clone());
            format!("{} = ?", quote_ident(column))
        })
        .collect();
    sql.push_str(" WHERE ");
    sql.push_str(&conditions.join(" AND "));
}

/// `INSERT INTO "t" ("a", "b") VALUES (?, ?)`
pub fn insert(table: &str, values: &Row) -> SqlResult<Statement> {
    let table_sql = table_ident(table)?;
    if values.is_empty() {
        return Err(SqlError::EmptyValues(table.to_string()));
    }

    let columns: Vec<String> = values.keys().map(|c| quote_ident(c)).collect();
    let placeholders = vec!["?"; values.len()].join(", ");

    Ok(Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table_sql,
            columns.join(", "),
            placeholders
        ),
        params: values.values().cloned().collect(),
    })
}

/// `UPDATE "t" SET "a" = ? WHERE "k" = ?`
pub fn update(table: &str, set: &Row, filter: &Row) -> SqlResult<Statement> {
    let table_sql = table_ident(table)?;
    if set.is_empty() {
        return Err(SqlError::EmptyValues(table.to_string()));
    }

    let mut params: Vec<Value> = set.values().cloned().collect();
    let assignments: Vec<String> = set.keys().map(|c| format!("{} = ?", quote_ident(c))).collect();
    let mut sql = format!("UPDATE {} SET {}", table_sql, assignments.join(", "));
    push_where(&mut sql, &mut params, filter);

    Ok(Statement { sql, params })
}

/// `DELETE FROM "t" WHERE "k" = ?`
pub fn delete(table: &str, filter: &Row) -> SqlResult<Statement> {
    let mut sql = format!("DELETE FROM {}", table_ident(table)?);
    let mut params = Vec::new();
    push_where(&mut sql, &mut params, filter);
    Ok(Statement { sql, params })
}

/// `SELECT * FROM "t" WHERE "k" = ?`
pub fn select(table: &str, filter: &Row) -> SqlResult<Statement> {
    let mut sql = format!("SELECT * FROM {}", table_ident(table)?);
    let mut params = Vec::new();
    push_where(&mut sql, &mut params, filter);
    Ok(Statement { sql, params })
}
