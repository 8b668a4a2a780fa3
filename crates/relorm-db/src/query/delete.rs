//! DELETE assembly and execution.

use relorm_core::{OrmError, OrmResult};

use super::condition::{Condition, ConditionContext};
use super::model_query::ModelQuery;
use super::{push_clause, render_conditions, returning_sql};
use crate::executor::{DbExecutor, ExecResult};
use crate::hydrate;
use crate::record::Record;
use crate::value::Value;

/// A DELETE of the rows matching the query's conditions.
///
/// A delete without any condition is refused before SQL is sent.
#[derive(Debug, Clone)]
pub struct DeleteQuery {
    base: ModelQuery,
    returning: Vec<String>,
}

impl DeleteQuery {
    pub(crate) const fn new(base: ModelQuery) -> Self {
        Self {
            base,
            returning: Vec::new(),
        }
    }

    /// Adds a WHERE condition.
    #[must_use]
    pub fn where_condition(&self, condition: Condition) -> Self {
        Self {
            base: self.base.where_condition(condition),
            returning: self.returning.clone(),
        }
    }

    /// Returns the named fields of every deleted row.
    #[must_use]
    pub fn returning<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.returning.extend(fields.into_iter().map(Into::into));
        next
    }

    /// Builds the statement and its arguments.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnboundedDelete`] without conditions and
    /// [`OrmError::ReturningUnsupported`] for RETURNING on a dialect
    /// without it.
    pub fn build_sql(&self) -> OrmResult<(String, Vec<Value>)> {
        let base = &self.base;
        let mapper = base.orm.mapper();
        let dialect = base.orm.dialect();
        let ctx = ConditionContext::new(mapper, &base.model, "").with_dialect(dialect);
        let (where_sql, args) = render_conditions(&base.conditions, &ctx)?;
        if where_sql.is_empty() {
            return Err(OrmError::UnboundedDelete(base.model.clone()));
        }

        let mut sql = format!(
            "DELETE FROM {}",
            dialect.quote_identifier(&mapper.model_to_table(&base.model)?)
        );
        push_clause(&mut sql, "WHERE", &where_sql);
        if !self.returning.is_empty() {
            if !dialect.supports_returning() {
                return Err(OrmError::ReturningUnsupported(dialect.name().to_string()));
            }
            sql.push_str(&returning_sql(&self.returning, &base.model, mapper, dialect)?);
        }
        Ok((dialect.finalize(sql), args))
    }

    /// Runs the delete.
    pub async fn exec(&self, db: &dyn DbExecutor) -> OrmResult<ExecResult> {
        let base = &self.base;
        base.traced("delete", async {
            let (sql, args) = self.build_sql()?;
            base.log_statement("delete", &sql, &args);
            db.execute_sql(&sql, &args).await
        })
        .await
    }

    /// Runs the delete and returns the RETURNING fields of the deleted rows.
    pub async fn exec_and_return(&self, db: &dyn DbExecutor) -> OrmResult<Vec<Record>> {
        let base = &self.base;
        base.traced("delete_returning", async {
            if self.returning.is_empty() {
                return Err(OrmError::NoReturningFields);
            }
            let (sql, args) = self.build_sql()?;
            base.log_statement("delete_returning", &sql, &args);
            let mut cursor = db.query(&sql, &args).await?;
            hydrate::scan_plain(base.orm.mapper(), &base.model, &mut *cursor)
        })
        .await
    }
}
