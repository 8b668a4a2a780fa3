//! Verbatim SQL.
//!
//! The statement is sent as written; placeholders must already use the
//! backend's style. Rows map to records keyed by column name unless a
//! translation renames the column.

use relorm_core::logging::query_span;
use relorm_core::{OrmResult, ResultExt};
use serde::de::DeserializeOwned;
use tracing::{debug, Instrument};

use crate::executor::{DbExecutor, ExecResult};
use crate::orm::Orm;
use crate::record::Record;
use crate::row::Row;
use crate::value::Value;

/// A raw SQL statement with its arguments.
#[derive(Debug, Clone)]
pub struct RawQuery {
    orm: Orm,
    sql: String,
    args: Vec<Value>,
    translations: Vec<(String, String)>,
}

impl RawQuery {
    pub(crate) const fn new(orm: Orm, sql: String, args: Vec<Value>) -> Self {
        Self {
            orm,
            sql,
            args,
            translations: Vec::new(),
        }
    }

    /// Renames `column` to `field` in returned records.
    #[must_use]
    pub fn translate(&self, column: impl Into<String>, field: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.translations.push((column.into(), field.into()));
        next
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    fn field_name<'a>(&'a self, column: &'a str) -> &'a str {
        self.translations
            .iter()
            .find(|(from, _)| from == column)
            .map_or(column, |(_, to)| to.as_str())
    }

    fn to_record(&self, row: Row) -> Record {
        let mut record = Record::new();
        let names: Vec<String> = row
            .columns()
            .iter()
            .map(|c| self.field_name(c).to_string())
            .collect();
        for (name, value) in names.into_iter().zip(row.into_values()) {
            record.set(name, value);
        }
        record
    }

    async fn traced<T>(
        &self,
        operation: &str,
        work: impl std::future::Future<Output = OrmResult<T>>,
    ) -> OrmResult<T> {
        if self.orm.options().log_sql {
            debug!(operation, sql = %self.sql, args = self.args.len(), "raw statement");
        }
        work.instrument(query_span("raw", operation))
            .await
            .context(format!("raw {operation}"))
    }

    /// Runs a statement that returns no rows.
    pub async fn exec(&self, db: &dyn DbExecutor) -> OrmResult<ExecResult> {
        self.traced("exec", db.execute_sql(&self.sql, &self.args))
            .await
    }

    /// Runs a query and returns every row as a record.
    pub async fn find(&self, db: &dyn DbExecutor) -> OrmResult<Vec<Record>> {
        self.traced("find", async {
            let mut cursor = db.query(&self.sql, &self.args).await?;
            let mut records = Vec::new();
            while let Some(row) = cursor.next_row()? {
                records.push(self.to_record(row));
            }
            Ok(records)
        })
        .await
    }

    /// Runs a query that must return exactly one row.
    ///
    /// # Errors
    ///
    /// Returns [`relorm_core::OrmError::DoesNotExist`] for no rows and
    /// [`relorm_core::OrmError::MultipleObjectsReturned`] for several.
    pub async fn find_one(&self, db: &dyn DbExecutor) -> OrmResult<Record> {
        self.traced("find_one", async {
            let row = db.query_one(&self.sql, &self.args).await?;
            Ok(self.to_record(row))
        })
        .await
    }

    /// Runs a query and deserializes each row into `T`.
    pub async fn find_as<T: DeserializeOwned>(&self, db: &dyn DbExecutor) -> OrmResult<Vec<T>> {
        self.find(db)
            .await?
            .iter()
            .map(Record::into_struct::<T>)
            .collect()
    }

    /// The ORM this query was built from.
    pub const fn orm(&self) -> &Orm {
        &self.orm
    }
}
