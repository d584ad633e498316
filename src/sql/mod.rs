//! Statement builders for equality-only CRUD.
//!
//! Builders are pure string formatting: identifiers are double-quoted,
//! every value is bound through a positional `?` placeholder, and WHERE
//! clauses are conjunctions of `"column" = ?`.

mod builder;
mod error;
mod executor;

pub use builder::{delete, insert, quote_ident, select, update, Statement};
pub use error::{SqlError, SqlResult};
pub use executor::Executor;
