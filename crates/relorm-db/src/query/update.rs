//! UPDATE assembly and execution.

use indexmap::IndexMap;
use relorm_core::{OrmError, OrmResult};

use super::condition::{Condition, ConditionContext};
use super::model_query::ModelQuery;
use super::{push_clause, render_conditions, returning_sql};
use crate::executor::{DbExecutor, ExecResult};
use crate::hydrate;
use crate::record::Record;
use crate::value::Value;

/// The new value of one updated field.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `col = ?`
    Set(Value),
    /// `col = col + ?`
    Increment(i64),
    /// `col = col - ?`
    Decrement(i64),
}

/// An UPDATE of the rows matching the query's conditions.
///
/// Assignments render in the order their fields were first assigned; a
/// later assignment to the same field replaces the earlier one in place.
#[derive(Debug, Clone)]
pub struct UpdateQuery {
    base: ModelQuery,
    assignments: IndexMap<String, Assignment>,
    returning: Vec<String>,
}

impl UpdateQuery {
    pub(crate) fn new(base: ModelQuery, data: Record) -> Self {
        let assignments = data
            .fields()
            .map(|(name, value)| (name.to_string(), Assignment::Set(value.clone())))
            .collect();
        Self {
            base,
            assignments,
            returning: Vec::new(),
        }
    }

    fn assign(&self, field: impl Into<String>, assignment: Assignment) -> Self {
        let mut next = self.clone();
        next.assignments.insert(field.into(), assignment);
        next
    }

    /// Assigns every field of `data`.
    #[must_use]
    pub fn set(&self, data: Record) -> Self {
        let mut next = self.clone();
        for (name, value) in data.fields() {
            next.assignments
                .insert(name.to_string(), Assignment::Set(value.clone()));
        }
        next
    }

    /// Assigns one field.
    #[must_use]
    pub fn set_field(&self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assign(field, Assignment::Set(value.into()))
    }

    /// Adds `by` to a numeric field.
    #[must_use]
    pub fn increment(&self, field: impl Into<String>, by: i64) -> Self {
        self.assign(field, Assignment::Increment(by))
    }

    /// Subtracts `by` from a numeric field.
    #[must_use]
    pub fn decrement(&self, field: impl Into<String>, by: i64) -> Self {
        self.assign(field, Assignment::Decrement(by))
    }

    /// Adds a condition to the ones inherited from the model query.
    #[must_use]
    pub fn where_condition(&self, condition: Condition) -> Self {
        Self {
            base: self.base.where_condition(condition),
            ..self.clone()
        }
    }

    /// Returns the named fields of every updated row.
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
    /// SET arguments come first, then WHERE arguments.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::NoUpdateData`] without assignments,
    /// [`OrmError::UnboundedUpdate`] without conditions, and
    /// [`OrmError::ReturningUnsupported`] for RETURNING on a dialect
    /// without it.
    pub fn build_sql(&self) -> OrmResult<(String, Vec<Value>)> {
        let base = &self.base;
        let mapper = base.orm.mapper();
        let dialect = base.orm.dialect();
        if self.assignments.is_empty() {
            return Err(OrmError::NoUpdateData);
        }

        let mut args = Vec::with_capacity(self.assignments.len());
        let mut sets = Vec::with_capacity(self.assignments.len());
        for (field, assignment) in &self.assignments {
            let column = dialect.quote_identifier(&mapper.field_to_column(&base.model, field)?);
            let (expr, arg) = match assignment {
                Assignment::Set(value) => (format!("{column} = ?"), value.clone()),
                Assignment::Increment(by) => (format!("{column} = {column} + ?"), Value::from(*by)),
                Assignment::Decrement(by) => (format!("{column} = {column} - ?"), Value::from(*by)),
            };
            sets.push(expr);
            args.push(arg);
        }

        let ctx = ConditionContext::new(mapper, &base.model, "").with_dialect(dialect);
        let (where_sql, where_args) = render_conditions(&base.conditions, &ctx)?;
        if where_sql.is_empty() {
            return Err(OrmError::UnboundedUpdate(base.model.clone()));
        }
        args.extend(where_args);

        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote_identifier(&mapper.model_to_table(&base.model)?),
            sets.join(", ")
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

    /// Runs the update.
    pub async fn exec(&self, db: &dyn DbExecutor) -> OrmResult<ExecResult> {
        let base = &self.base;
        base.traced("update", async {
            let (sql, args) = self.build_sql()?;
            base.log_statement("update", &sql, &args);
            db.execute_sql(&sql, &args).await
        })
        .await
    }

    /// Runs the update and returns the RETURNING fields of every updated row.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::NoReturningFields`] when no fields were named.
    pub async fn exec_and_return(&self, db: &dyn DbExecutor) -> OrmResult<Vec<Record>> {
        let base = &self.base;
        base.traced("update_returning", async {
            if self.returning.is_empty() {
                return Err(OrmError::NoReturningFields);
            }
            let (sql, args) = self.build_sql()?;
            base.log_statement("update_returning", &sql, &args);
            let mut cursor = db.query(&sql, &args).await?;
            hydrate::scan_plain(base.orm.mapper(), &base.model, &mut *cursor)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DatabaseBackendType;
    use crate::orm::Orm;
    use crate::query::condition::{field, FieldRef};
    use crate::testing::{registry, MockDb};

    fn posts(backend: DatabaseBackendType) -> ModelQuery {
        Orm::new(registry(), backend).model("Post")
    }

    #[test]
    fn test_set_and_atomic_in_one_statement() {
        let (sql, args) = posts(DatabaseBackendType::SQLite)
            .where_condition(field("id").equals(3))
            .update(Record::new().with("title", "New"))
            .increment("views", 1)
            .decrement("userId", 2)
            .build_sql()
            .unwrap();
        assert_eq!(
            sql,
            "UPDATE `posts` SET `title` = ?, `views` = `views` + ?, \
             `user_id` = `user_id` - ? WHERE `id` = ?"
        );
        assert_eq!(
            args,
            [
                Value::from("New"),
                Value::from(1_i64),
                Value::from(2_i64),
                Value::from(3)
            ]
        );
    }

    #[test]
    fn test_reassignment_keeps_position() {
        let (sql, args) = posts(DatabaseBackendType::PostgreSQL)
            .update(Record::new().with("views", 1).with("title", "a"))
            .increment("views", 5)
            .where_condition(field("id").equals(1))
            .build_sql()
            .unwrap();
        assert_eq!(
            sql,
            r#"UPDATE "posts" SET "views" = "views" + $1, "title" = $2 WHERE "id" = $3"#
        );
        assert_eq!(args[0], Value::from(5_i64));
    }

    #[test]
    fn test_requires_data_and_condition() {
        let err = posts(DatabaseBackendType::SQLite)
            .where_condition(field("id").equals(1))
            .update(Record::new())
            .build_sql()
            .unwrap_err();
        assert!(matches!(err, OrmError::NoUpdateData));

        let err = posts(DatabaseBackendType::SQLite)
            .update(Record::new().with("title", "x"))
            .build_sql()
            .unwrap_err();
        assert!(matches!(err, OrmError::UnboundedUpdate(model) if model == "Post"));
    }

    #[test]
    fn test_returning() {
        let (sql, _) = posts(DatabaseBackendType::PostgreSQL)
            .update(Record::new().with("title", "x"))
            .where_condition(field("userId").equals(1))
            .returning(["id", "title"])
            .build_sql()
            .unwrap();
        assert!(sql.ends_with(r#"RETURNING "id", "title""#));

        let err = posts(DatabaseBackendType::MySQL)
            .update(Record::new().with("title", "x"))
            .where_condition(field("userId").equals(1))
            .returning(["id"])
            .build_sql()
            .unwrap_err();
        assert!(matches!(err, OrmError::ReturningUnsupported(_)));
    }

    #[tokio::test]
    async fn test_unbounded_update_sends_nothing() {
        let db = MockDb::new();
        let err = posts(DatabaseBackendType::SQLite)
            .update(Record::new().with("title", "x"))
            .exec(&db)
            .await
            .unwrap_err();
        assert!(matches!(err.root(), OrmError::UnboundedUpdate(_)));
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn test_exec_and_return_maps_rows() {
        let db = MockDb::new().with_rows(
            vec!["id", "user_id"],
            vec![
                vec![Value::from(1), Value::from(7)],
                vec![Value::from(2), Value::from(7)],
            ],
        );
        let rows = posts(DatabaseBackendType::SQLite)
            .update(Record::new().with("published", true))
            .where_condition(field("userId").equals(7))
            .returning(["id", "userId"])
            .exec_and_return(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("userId"), Some(&Value::from(7)));
    }

    #[test]
    fn test_condition_on_unjoined_model_rejected() {
        let err = posts(DatabaseBackendType::PostgreSQL)
            .where_condition(FieldRef::on("User", "id").equals(1))
            .update(Record::new().with("title", "x"))
            .build_sql()
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidQuery(_)));
    }
}
