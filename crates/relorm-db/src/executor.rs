//! The executor boundary.
//!
//! [`DbExecutor`] is what query objects run against. It lives in this crate
//! so backends (in `relorm-db-backends`) can implement it without a
//! dependency cycle. Queries hand it finished SQL and arguments; it returns
//! an [`ExecResult`] or a [`RowCursor`]. Cursors are owned by the caller that
//! requested them and released when dropped, on every exit path.

use std::collections::VecDeque;
use std::sync::Arc;

use relorm_core::{OrmError, OrmResult};

use crate::dialect::DatabaseBackendType;
use crate::row::Row;
use crate::value::Value;

/// The outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// The id generated by the last INSERT, where the backend reports one.
    pub last_insert_id: Option<i64>,
    /// The number of rows changed.
    pub rows_affected: u64,
}

/// A sequential, forward-only handle over query results.
pub trait RowCursor: Send {
    /// The column names, in result order.
    fn columns(&self) -> &Arc<[String]>;

    /// Advances to the next row; `None` once exhausted.
    ///
    /// # Errors
    ///
    /// Returns any error the backend reports while producing the row.
    fn next_row(&mut self) -> OrmResult<Option<Row>>;
}

/// A cursor over rows already fetched into memory.
#[derive(Debug, Clone)]
pub struct RowSet {
    columns: Arc<[String]>,
    rows: VecDeque<Vec<Value>>,
}

impl RowSet {
    /// Creates a row set from column names and positional rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into(),
            rows: rows.into(),
        }
    }

    /// Number of rows not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowCursor for RowSet {
    fn columns(&self) -> &Arc<[String]> {
        &self.columns
    }

    fn next_row(&mut self) -> OrmResult<Option<Row>> {
        self.rows
            .pop_front()
            .map(|values| Row::new(Arc::clone(&self.columns), values))
            .transpose()
    }
}

/// Drains a cursor into a vector of rows.
///
/// # Errors
///
/// Returns the first error the cursor reports.
pub fn collect_rows(cursor: &mut dyn RowCursor) -> OrmResult<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = cursor.next_row()? {
        rows.push(row);
    }
    Ok(rows)
}

/// Minimal async database executor.
///
/// Backends implement this; query objects accept `&dyn DbExecutor`.
/// Errors the backend reports are returned unchanged.
#[async_trait::async_trait]
pub trait DbExecutor: Send + Sync {
    /// Returns the backend type, which also serves as its SQL dialect.
    fn backend_type(&self) -> DatabaseBackendType;

    /// Runs a statement that does not return rows.
    async fn execute_sql(&self, sql: &str, params: &[Value]) -> OrmResult<ExecResult>;

    /// Runs a query and returns a cursor over its rows.
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Box<dyn RowCursor>>;

    /// Runs a query that must return exactly one row.
    ///
    /// Returns `DoesNotExist` if there are no rows and
    /// `MultipleObjectsReturned` if there is more than one.
    async fn query_one(&self, sql: &str, params: &[Value]) -> OrmResult<Row> {
        let mut cursor = self.query(sql, params).await?;
        let first = cursor
            .next_row()?
            .ok_or_else(|| OrmError::DoesNotExist(sql.to_string()))?;
        if cursor.next_row()?.is_some() {
            return Err(OrmError::MultipleObjectsReturned(sql.to_string()));
        }
        Ok(first)
    }
}
