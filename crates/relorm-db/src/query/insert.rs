//! INSERT assembly and execution.

use relorm_core::{OrmError, OrmResult};
use tracing::warn;

use super::model_query::ModelQuery;
use super::returning_sql;
use crate::dialect::{ConflictSyntax, Dialect};
use crate::executor::{DbExecutor, ExecResult};
use crate::record::Record;
use crate::value::Value;

/// What to do when an inserted row collides with a unique key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictAction {
    /// Skip the colliding row.
    Ignore,
    /// Replace the colliding row.
    Replace,
    /// Update the colliding row.
    Update {
        /// The conflict target fields; empty means the primary key.
        target: Vec<String>,
        /// The fields to overwrite; empty means every inserted field
        /// outside the target.
        set: Vec<String>,
    },
}

/// An INSERT of one or more rows.
///
/// Every row must have the same fields as the first; values are bound in
/// the first row's field order.
#[derive(Debug, Clone)]
pub struct InsertQuery {
    base: ModelQuery,
    rows: Vec<Record>,
    conflict: Option<ConflictAction>,
    returning: Vec<String>,
}

impl InsertQuery {
    pub(crate) const fn new(base: ModelQuery, rows: Vec<Record>) -> Self {
        Self {
            base,
            rows,
            conflict: None,
            returning: Vec::new(),
        }
    }

    /// Adds another row.
    #[must_use]
    pub fn values(&self, row: Record) -> Self {
        let mut next = self.clone();
        next.rows.push(row);
        next
    }

    /// Sets the conflict policy.
    #[must_use]
    pub fn on_conflict(&self, action: ConflictAction) -> Self {
        Self {
            conflict: Some(action),
            ..self.clone()
        }
    }

    /// Returns the named fields of the inserted row.
    #[must_use]
    pub fn returning<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            returning: fields.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }

    /// Builds the statement and its arguments.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::NoInsertData`] without rows,
    /// [`OrmError::InvalidQuery`] for rows with differing fields, and
    /// [`OrmError::ReturningUnsupported`] when RETURNING is requested on a
    /// dialect without it.
    pub fn build_sql(&self) -> OrmResult<(String, Vec<Value>)> {
        let base = &self.base;
        let mapper = base.orm.mapper();
        let dialect = base.orm.dialect();
        let model = base.model.as_str();
        let schema = mapper.schema(model)?;
        let first = self.rows.first().ok_or(OrmError::NoInsertData)?;

        let fields: Vec<&str> = first.field_names().collect();
        for (i, row) in self.rows.iter().enumerate().skip(1) {
            if row.len() != fields.len() || fields.iter().any(|f| !row.contains(f)) {
                return Err(OrmError::InvalidQuery(format!(
                    "row {i} inserted into {model} has different fields than the first row"
                )));
            }
        }
        let columns = fields
            .iter()
            .map(|f| mapper.field_to_column(model, f))
            .collect::<OrmResult<Vec<_>>>()?;

        let verb = match (&self.conflict, dialect.conflict_syntax()) {
            (Some(ConflictAction::Ignore), ConflictSyntax::InsertOr) => "INSERT OR IGNORE INTO",
            (Some(ConflictAction::Ignore), ConflictSyntax::OnDuplicateKey) => "INSERT IGNORE INTO",
            (Some(ConflictAction::Replace), ConflictSyntax::InsertOr) => "INSERT OR REPLACE INTO",
            (Some(ConflictAction::Replace), ConflictSyntax::OnDuplicateKey) => "REPLACE INTO",
            _ => "INSERT INTO",
        };
        let mut sql = format!("{verb} {}", dialect.quote_identifier(&schema.table_name));
        let mut args = Vec::with_capacity(columns.len() * self.rows.len());

        if columns.is_empty() {
            if self.rows.len() > 1 {
                return Err(OrmError::InvalidQuery(format!(
                    "a multi-row insert into {model} needs at least one field"
                )));
            }
            sql.push_str(if dialect.supports_default_values() {
                " DEFAULT VALUES"
            } else {
                " () VALUES ()"
            });
        } else {
            let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
            sql.push_str(&format!(
                " ({}) VALUES {}",
                quote_all(dialect, &columns),
                vec![row_placeholders; self.rows.len()].join(", ")
            ));
            for row in &self.rows {
                args.extend(
                    fields
                        .iter()
                        .map(|f| row.get(f).cloned().unwrap_or(Value::Null)),
                );
            }
        }

        sql.push_str(&self.conflict_clause(dialect, &columns)?);

        if !self.returning.is_empty() {
            if !dialect.supports_returning() {
                return Err(OrmError::ReturningUnsupported(dialect.name().to_string()));
            }
            sql.push_str(&returning_sql(&self.returning, model, mapper, dialect)?);
        }
        Ok((dialect.finalize(sql), args))
    }

    fn conflict_clause(&self, dialect: &dyn Dialect, columns: &[String]) -> OrmResult<String> {
        let primary_key: &[String] = &[];
        let (target, set) = match (&self.conflict, dialect.conflict_syntax()) {
            (Some(ConflictAction::Ignore), ConflictSyntax::OnConflict) => {
                return Ok(" ON CONFLICT DO NOTHING".to_string());
            }
            (Some(ConflictAction::Replace), ConflictSyntax::OnConflict) => {
                (primary_key, primary_key)
            }
            (Some(ConflictAction::Update { target, set }), _) => {
                (target.as_slice(), set.as_slice())
            }
            _ => return Ok(String::new()),
        };

        let mapper = self.base.orm.mapper();
        let model = self.base.model.as_str();
        let target_columns = if target.is_empty() {
            mapper
                .schema(model)?
                .primary_key_fields()
                .iter()
                .map(|f| f.column_name().to_string())
                .collect()
        } else {
            mapper.fields_to_columns(model, target)?
        };
        let set_columns: Vec<String> = if set.is_empty() {
            columns
                .iter()
                .filter(|c| !target_columns.contains(c))
                .cloned()
                .collect()
        } else {
            mapper.fields_to_columns(model, set)?
        };

        let q = |c: &str| dialect.quote_identifier(c);
        if dialect.conflict_syntax() == ConflictSyntax::OnDuplicateKey {
            if set_columns.is_empty() {
                return Err(OrmError::InvalidQuery(format!(
                    "an upsert into {model} has no fields to update"
                )));
            }
            let assignments: Vec<String> = set_columns
                .iter()
                .map(|c| format!("{} = VALUES({})", q(c), q(c)))
                .collect();
            return Ok(format!(" ON DUPLICATE KEY UPDATE {}", assignments.join(", ")));
        }

        let target_sql = quote_all(dialect, &target_columns);
        if set_columns.is_empty() {
            return Ok(format!(" ON CONFLICT ({target_sql}) DO NOTHING"));
        }
        let assignments: Vec<String> = set_columns
            .iter()
            .map(|c| format!("{} = EXCLUDED.{}", q(c), q(c)))
            .collect();
        Ok(format!(
            " ON CONFLICT ({target_sql}) DO UPDATE SET {}",
            assignments.join(", ")
        ))
    }

    /// Runs the insert.
    pub async fn exec(&self, db: &dyn DbExecutor) -> OrmResult<ExecResult> {
        let base = &self.base;
        base.traced("insert", async {
            let (sql, args) = self.build_sql()?;
            base.log_statement("insert", &sql, &args);
            db.execute_sql(&sql, &args).await
        })
        .await
    }

    /// Runs the insert and returns the RETURNING fields of the first row.
    ///
    /// When the statement returns no row, it is run once more without
    /// reading rows so the backend can report the underlying error (such as
    /// a constraint violation) instead of an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::NoReturningFields`] when no fields were named,
    /// [`OrmError::ReturningUnsupported`] on dialects without RETURNING,
    /// and [`OrmError::DoesNotExist`] when no row came back and the retry
    /// reported nothing.
    pub async fn exec_and_return(&self, db: &dyn DbExecutor) -> OrmResult<Record> {
        let base = &self.base;
        base.traced("insert_returning", async {
            if self.returning.is_empty() {
                return Err(OrmError::NoReturningFields);
            }
            let (sql, args) = self.build_sql()?;
            base.log_statement("insert_returning", &sql, &args);

            let first = {
                let mut cursor = db.query(&sql, &args).await?;
                let columns = cursor.columns().clone();
                cursor
                    .next_row()?
                    .map(|row| (columns, row.into_values()))
            };
            if let Some((columns, values)) = first {
                return base
                    .orm
                    .mapper()
                    .columns_to_record(&base.model, &columns, values);
            }

            warn!(model = %base.model, "insert returned no row; re-running to surface the error");
            db.execute_sql(&sql, &args).await?;
            Err(OrmError::DoesNotExist(format!(
                "insert into {} returned no row",
                base.model
            )))
        })
        .await
    }
}

fn quote_all(dialect: &dyn Dialect, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}
