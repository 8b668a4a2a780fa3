//! SELECT assembly, execution, and hydration.
//!
//! Without includes the statement reads `alias.*` and rows map straight to
//! records. With includes every column of the root and of each joined table
//! is listed as `alias.column AS alias_column`, so the hydrators can tell
//! same-named columns apart. LIMIT and OFFSET with includes page the root
//! rows: the root table is paged in a subquery before the joins fan it out.

use relorm_core::{OrmError, OrmResult};
use serde::de::DeserializeOwned;

use super::condition::{Condition, ConditionContext};
use super::join::JoinClause;
use super::model_query::ModelQuery;
use super::{limit_offset_sql, push_clause, render_conditions, NullsOrder, Order, OrderBy};
use crate::dialect::Dialect;
use crate::executor::DbExecutor;
use crate::hydrate::{self, IncludeOption};
use crate::record::Record;
use crate::value::Value;

/// A SELECT on one model.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    base: ModelQuery,
    fields: Vec<String>,
    distinct: bool,
    distinct_on: Vec<String>,
}

#[derive(Debug)]
struct Statement {
    sql: String,
    args: Vec<Value>,
    joins: Vec<JoinClause>,
}

impl SelectQuery {
    pub(crate) const fn new(base: ModelQuery, fields: Vec<String>) -> Self {
        Self {
            base,
            fields,
            distinct: false,
            distinct_on: Vec::new(),
        }
    }

    fn rebase(&self, base: ModelQuery) -> Self {
        Self {
            base,
            ..self.clone()
        }
    }

    /// The selected fields; empty means all.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Adds a condition.
    #[must_use]
    pub fn where_condition(&self, condition: Condition) -> Self {
        self.rebase(self.base.where_condition(condition))
    }

    /// Adds a raw SQL condition.
    #[must_use]
    pub fn where_raw(&self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        self.rebase(self.base.where_raw(sql, args))
    }

    /// Eagerly loads a relation path.
    #[must_use]
    pub fn include(&self, path: impl Into<String>) -> Self {
        self.rebase(self.base.include(path))
    }

    /// Eagerly loads a relation path with post-hydration directives.
    #[must_use]
    pub fn include_with(&self, option: IncludeOption) -> Self {
        self.rebase(self.base.include_with(option))
    }

    /// Appends a sort term.
    #[must_use]
    pub fn order_by(&self, field: impl Into<String>, order: Order) -> Self {
        self.rebase(self.base.order_by(field, order))
    }

    /// Appends a sort term with explicit NULL placement.
    #[must_use]
    pub fn order_by_nulls(
        &self,
        field: impl Into<String>,
        order: Order,
        nulls: NullsOrder,
    ) -> Self {
        self.rebase(self.base.order_by_nulls(field, order, nulls))
    }

    /// Appends a prepared sort term.
    #[must_use]
    pub fn order_by_term(&self, term: OrderBy) -> Self {
        self.rebase(self.base.order_by_term(term))
    }

    /// Sets the GROUP BY fields.
    #[must_use]
    pub fn group_by<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rebase(self.base.group_by(fields))
    }

    /// Sets the HAVING condition.
    #[must_use]
    pub fn having(&self, condition: Condition) -> Self {
        self.rebase(self.base.having(condition))
    }

    /// Caps the number of root rows.
    #[must_use]
    pub fn limit(&self, limit: u64) -> Self {
        self.rebase(self.base.limit(limit))
    }

    /// Skips leading root rows.
    #[must_use]
    pub fn offset(&self, offset: u64) -> Self {
        self.rebase(self.base.offset(offset))
    }

    /// `SELECT DISTINCT`.
    #[must_use]
    pub fn distinct(&self) -> Self {
        Self {
            distinct: true,
            ..self.clone()
        }
    }

    /// `SELECT DISTINCT ON (fields)`, emulated with GROUP BY where the
    /// dialect has no native form.
    #[must_use]
    pub fn distinct_on<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            distinct: true,
            distinct_on: fields.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }

    // ── SQL ───────────────────────────────────────────────────────────

    /// Builds the statement and its arguments.
    ///
    /// # Errors
    ///
    /// Returns resolution errors for unknown models, relations, or (with
    /// includes) selected fields, and [`OrmError::InvalidQuery`] for invalid
    /// include paths or for conditions on included models combined with
    /// LIMIT or OFFSET.
    pub fn build_sql(&self) -> OrmResult<(String, Vec<Value>)> {
        let statement = self.statement()?;
        Ok((statement.sql, statement.args))
    }

    /// Builds `SELECT COUNT(*)` over the rows the select would return,
    /// ignoring includes, ordering, and pagination.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownModel`] for an unregistered model.
    pub fn build_count_sql(&self) -> OrmResult<(String, Vec<Value>)> {
        let base = &self.base;
        let mapper = base.orm.mapper();
        let dialect = base.orm.dialect();
        let table = dialect.quote_identifier(&mapper.model_to_table(&base.model)?);
        let ctx = ConditionContext::new(mapper, &base.model, "").with_dialect(dialect);
        let (where_sql, mut args) = render_conditions(&base.conditions, &ctx)?;

        if !self.distinct && base.group_by.is_empty() {
            let mut sql = format!("SELECT COUNT(*) FROM {table}");
            push_clause(&mut sql, "WHERE", &where_sql);
            return Ok((dialect.finalize(sql), args));
        }

        let listed = [&self.distinct_on, &self.fields, &base.group_by]
            .into_iter()
            .find(|f| !f.is_empty());
        let list = match listed {
            Some(fields) => self.columns(fields, "")?,
            None => "*".to_string(),
        };
        let mut inner = format!(
            "SELECT {}{list} FROM {table}",
            if self.distinct { "DISTINCT " } else { "" }
        );
        push_clause(&mut inner, "WHERE", &where_sql);
        if !base.group_by.is_empty() {
            push_clause(&mut inner, "GROUP BY", &self.columns(&base.group_by, "")?);
        }
        if let Some(having) = &base.having {
            let (having_sql, having_args) = having.render(&ctx)?;
            push_clause(&mut inner, "HAVING", &having_sql);
            args.extend(having_args);
        }
        let sql = format!(
            "SELECT COUNT(*) FROM ({inner}) AS {}",
            dialect.quote_identifier("counted")
        );
        Ok((dialect.finalize(sql), args))
    }

    fn statement(&self) -> OrmResult<Statement> {
        let base = &self.base;
        let mapper = base.orm.mapper();
        let dialect = base.orm.dialect();
        let schema = mapper.schema(&base.model)?;
        let joins = base.plan_joins()?;
        let alias = base.alias.as_str();
        let q = |ident: &str| dialect.quote_identifier(ident);

        let mut fields = self.fields.clone();
        let mut group_by = base.group_by.clone();
        let mut sql = String::from("SELECT ");
        if !self.distinct_on.is_empty() && dialect.supports_distinct_on() {
            sql.push_str(&format!(
                "DISTINCT ON ({}) ",
                self.columns(&self.distinct_on, alias)?
            ));
        } else if self.distinct {
            sql.push_str("DISTINCT ");
            if !self.distinct_on.is_empty() {
                if fields.is_empty() {
                    fields.clone_from(&self.distinct_on);
                }
                if group_by.is_empty() {
                    group_by.clone_from(&self.distinct_on);
                }
            }
        }

        if joins.is_empty() {
            if fields.is_empty() {
                sql.push_str(&format!("{}.*", q(alias)));
            } else {
                sql.push_str(&self.columns(&fields, alias)?);
            }
        } else {
            let mut parts = Vec::new();
            if fields.is_empty() {
                parts.extend(
                    schema
                        .fields
                        .iter()
                        .map(|f| aliased_column(dialect, alias, f.column_name())),
                );
            } else {
                for pk in schema.primary_key_fields() {
                    if !fields.contains(&pk.name) {
                        parts.push(aliased_column(dialect, alias, pk.column_name()));
                    }
                }
                for field in &fields {
                    parts.push(aliased_column(dialect, alias, schema.column_name(field)?));
                }
            }
            for join in &joins {
                let Some(model) = &join.model else {
                    continue;
                };
                let joined = mapper.schema(model)?;
                parts.extend(
                    joined
                        .fields
                        .iter()
                        .map(|f| aliased_column(dialect, &join.alias, f.column_name())),
                );
            }
            sql.push_str(&parts.join(", "));
        }

        let mut ctx = ConditionContext::new(mapper, &base.model, alias).with_dialect(dialect);
        for join in &joins {
            if let Some(model) = &join.model {
                ctx = ctx.with_joined(model.clone(), join.alias.clone());
            }
        }
        let (where_sql, mut args) = render_conditions(&base.conditions, &ctx)?;
        let order_sql = self.order_sql(alias)?;
        let paging = limit_offset_sql(base.limit, base.offset, dialect);
        let page_root = !joins.is_empty() && !paging.is_empty();

        let table = format!("{} AS {}", q(&schema.table_name), q(alias));
        sql.push_str(" FROM ");
        if page_root {
            if base
                .conditions
                .iter()
                .any(|c| c.mentions_other_model(&base.model))
            {
                return Err(OrmError::InvalidQuery(format!(
                    "conditions on included models cannot be combined with limit or offset on {}",
                    base.model
                )));
            }
            let mut inner = format!("SELECT * FROM {table}");
            push_clause(&mut inner, "WHERE", &where_sql);
            push_clause(&mut inner, "ORDER BY", &order_sql);
            push_clause(&mut inner, "", &paging);
            sql.push_str(&format!("({inner}) AS {}", q(alias)));
        } else {
            sql.push_str(&table);
        }
        for join in &joins {
            sql.push(' ');
            sql.push_str(&join.to_sql(dialect));
        }
        if !page_root {
            push_clause(&mut sql, "WHERE", &where_sql);
        }
        if !group_by.is_empty() {
            push_clause(&mut sql, "GROUP BY", &self.columns(&group_by, alias)?);
        }
        if let Some(having) = &base.having {
            let (having_sql, having_args) = having.render(&ctx)?;
            push_clause(&mut sql, "HAVING", &having_sql);
            args.extend(having_args);
        }
        push_clause(&mut sql, "ORDER BY", &order_sql);
        if !page_root {
            push_clause(&mut sql, "", &paging);
        }

        Ok(Statement {
            sql: dialect.finalize(sql),
            args,
            joins,
        })
    }

    /// Qualified, comma-separated columns. Names containing `.` or `(` are
    /// treated as expressions and passed through.
    fn columns(&self, fields: &[String], alias: &str) -> OrmResult<String> {
        fields
            .iter()
            .map(|f| self.column_expr(f, alias))
            .collect::<OrmResult<Vec<_>>>()
            .map(|cols| cols.join(", "))
    }

    fn column_expr(&self, field: &str, alias: &str) -> OrmResult<String> {
        if field.contains('.') || field.contains('(') {
            return Ok(field.to_string());
        }
        let dialect = self.base.orm.dialect();
        let column = dialect.quote_identifier(
            &self
                .base
                .orm
                .mapper()
                .field_to_column(&self.base.model, field)?,
        );
        Ok(if alias.is_empty() {
            column
        } else {
            format!("{}.{column}", dialect.quote_identifier(alias))
        })
    }

    fn order_sql(&self, alias: &str) -> OrmResult<String> {
        let dialect = self.base.orm.dialect();
        self.base
            .order_by
            .iter()
            .map(|term| {
                let expr = self.column_expr(&term.field, alias)?;
                Ok(dialect.order_term(&expr, term.order, term.nulls))
            })
            .collect::<OrmResult<Vec<_>>>()
            .map(|terms| terms.join(", "))
    }

    // ── Execution ─────────────────────────────────────────────────────

    /// Runs the select and hydrates the rows, includes included.
    pub async fn find_many(&self, db: &dyn DbExecutor) -> OrmResult<Vec<Record>> {
        let base = &self.base;
        base.traced("find_many", async {
            let statement = self.statement()?;
            base.log_statement("find_many", &statement.sql, &statement.args);
            let mut cursor = db.query(&statement.sql, &statement.args).await?;
            hydrate::hydrate(
                base.orm.mapper(),
                &base.model,
                &base.alias,
                &statement.joins,
                &base.includes,
                &mut *cursor,
            )
        })
        .await
    }

    /// Runs the select and deserializes each record into `T`.
    pub async fn find_many_as<T: DeserializeOwned>(
        &self,
        db: &dyn DbExecutor,
    ) -> OrmResult<Vec<T>> {
        self.find_many(db)
            .await?
            .iter()
            .map(Record::into_struct::<T>)
            .collect()
    }

    /// Runs the select with LIMIT 1.
    pub async fn find_first(&self, db: &dyn DbExecutor) -> OrmResult<Option<Record>> {
        Ok(self.limit(1).find_many(db).await?.into_iter().next())
    }

    /// Counts the rows the select would return.
    pub async fn count(&self, db: &dyn DbExecutor) -> OrmResult<i64> {
        let base = &self.base;
        base.traced("count", async {
            let (sql, args) = self.build_count_sql()?;
            base.log_statement("count", &sql, &args);
            db.query_one(&sql, &args).await?.get_by_index::<i64>(0)
        })
        .await
    }
}

fn aliased_column(dialect: &dyn Dialect, alias: &str, column: &str) -> String {
    format!(
        "{}.{} AS {}",
        dialect.quote_identifier(alias),
        dialect.quote_identifier(column),
        dialect.quote_identifier(&format!("{alias}_{column}"))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DatabaseBackendType;
    use crate::orm::Orm;
    use crate::query::condition::{field, FieldRef};
    use crate::testing::{registry, MockDb};

    fn users(backend: DatabaseBackendType) -> ModelQuery {
        Orm::new(registry(), backend).model("User")
    }

    fn sqlite_users() -> ModelQuery {
        users(DatabaseBackendType::SQLite)
    }

    // ── Plain selects ─────────────────────────────────────────────────

    #[test]
    fn test_select_all_without_joins() {
        let (sql, args) = sqlite_users().build_sql().unwrap();
        assert_eq!(sql, "SELECT `u`.* FROM `users` AS `u`");
        assert!(args.is_empty());
    }

    #[test]
    fn test_select_fields_where_order_paging() {
        let (sql, args) = sqlite_users()
            .select(["name", "email"])
            .where_condition(field("age").greater_than(18))
            .where_condition(field("name").like("A%") | field("name").is_null())
            .order_by("name", Order::Asc)
            .limit(10)
            .offset(20)
            .build_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT `u`.`name`, `u`.`email` FROM `users` AS `u` \
             WHERE (`u`.`age` > ?) AND ((`u`.`name` LIKE ?) OR (`u`.`name` IS NULL)) \
             ORDER BY `u`.`name` ASC NULLS LAST LIMIT 10 OFFSET 20"
        );
        assert_eq!(args, [Value::from(18), Value::from("A%")]);
    }

    #[test]
    fn test_offset_without_limit() {
        let (sql, _) = sqlite_users().offset(5).build_sql().unwrap();
        assert!(sql.ends_with(&format!("LIMIT {} OFFSET 5", i64::MAX)));

        let (sql, _) = users(DatabaseBackendType::PostgreSQL)
            .offset(5)
            .build_sql()
            .unwrap();
        assert!(sql.ends_with(r#"AS "u" OFFSET 5"#));
    }

    #[test]
    fn test_postgres_placeholders_and_quoting() {
        let (sql, _) = users(DatabaseBackendType::PostgreSQL)
            .where_condition(field("age").between(1, 9))
            .build_sql()
            .unwrap();
        assert_eq!(
            sql,
            r#"SELECT "u".* FROM "users" AS "u" WHERE "u"."age" BETWEEN $1 AND $2"#
        );
    }

    #[test]
    fn test_mysql_order_without_nulls_keyword() {
        let (sql, _) = users(DatabaseBackendType::MySQL)
            .order_by("age", Order::Desc)
            .order_by_nulls("name", Order::Asc, NullsOrder::First)
            .build_sql()
            .unwrap();
        assert!(sql.ends_with("ORDER BY `u`.`age` DESC, `u`.`name` IS NULL DESC, `u`.`name` ASC"));
    }

    #[test]
    fn test_group_by_and_having() {
        let (sql, args) = Orm::new(registry(), DatabaseBackendType::SQLite)
            .model("Post")
            .select(["userId", "COUNT(*)"])
            .group_by(["userId"])
            .having(crate::query::condition::raw("COUNT(*) > ?", vec![Value::from(2)]))
            .build_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT `p`.`user_id`, COUNT(*) FROM `posts` AS `p` \
             GROUP BY `p`.`user_id` HAVING COUNT(*) > ?"
        );
        assert_eq!(args, [Value::from(2)]);
    }

    // ── Distinct ──────────────────────────────────────────────────────

    #[test]
    fn test_distinct() {
        let (sql, _) = sqlite_users().select(["name"]).distinct().build_sql().unwrap();
        assert_eq!(sql, "SELECT DISTINCT `u`.`name` FROM `users` AS `u`");
    }

    #[test]
    fn test_distinct_on_native_and_emulated() {
        let (sql, _) = users(DatabaseBackendType::PostgreSQL)
            .select_all()
            .distinct_on(["email"])
            .build_sql()
            .unwrap();
        assert_eq!(
            sql,
            r#"SELECT DISTINCT ON ("u"."email") "u".* FROM "users" AS "u""#
        );

        let (sql, _) = sqlite_users()
            .select_all()
            .distinct_on(["email"])
            .build_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT DISTINCT `u`.`email` FROM `users` AS `u` GROUP BY `u`.`email`"
        );
    }

    // ── Joined selects ────────────────────────────────────────────────

    #[test]
    fn test_include_lists_aliased_columns() {
        let (sql, _) = sqlite_users().include("posts").build_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT `u`.`id` AS `u_id`, `u`.`name` AS `u_name`, `u`.`email` AS `u_email`, \
             `u`.`age` AS `u_age`, `p`.`id` AS `p_id`, `p`.`title` AS `p_title`, \
             `p`.`content` AS `p_content`, `p`.`user_id` AS `p_user_id`, \
             `p`.`published` AS `p_published`, `p`.`views` AS `p_views` \
             FROM `users` AS `u` LEFT JOIN `posts` AS `p` ON `p`.`user_id` = `u`.`id`"
        );
        assert!(!sql.contains(".*"));
    }

    #[test]
    fn test_include_many_to_many_skips_junction_columns() {
        let (sql, _) = Orm::new(registry(), DatabaseBackendType::SQLite)
            .model("Post")
            .select(["title"])
            .include("tags")
            .build_sql()
            .unwrap();
        assert!(sql.starts_with(
            "SELECT `p`.`id` AS `p_id`, `p`.`title` AS `p_title`, \
             `t`.`id` AS `t_id`, `t`.`name` AS `t_name` FROM"
        ));
        assert!(sql.contains("LEFT JOIN `post_tags` AS `pt` ON `p`.`id` = `pt`.`posts_id`"));
        assert!(sql.contains("LEFT JOIN `tags` AS `t` ON `pt`.`tags_id` = `t`.`id`"));
    }

    #[test]
    fn test_condition_on_joined_model_uses_its_alias() {
        let (sql, _) = sqlite_users()
            .include("posts")
            .where_condition(FieldRef::on("Post", "title").equals("x"))
            .build_sql()
            .unwrap();
        assert!(sql.ends_with("WHERE `p`.`title` = ?"));
    }

    #[test]
    fn test_condition_on_model_not_included_is_error() {
        let query = sqlite_users().where_condition(FieldRef::on("Post", "id").equals(5));
        let err = query.build_sql().unwrap_err();
        assert!(matches!(err, OrmError::InvalidQuery(_)));
        assert!(query.select_all().build_count_sql().is_err());
    }

    #[test]
    fn test_paging_with_includes_pages_root_rows() {
        let (sql, args) = sqlite_users()
            .include("posts")
            .where_condition(field("age").greater_than(1))
            .order_by("name", Order::Asc)
            .limit(2)
            .build_sql()
            .unwrap();
        assert!(sql.contains(
            "FROM (SELECT * FROM `users` AS `u` WHERE `u`.`age` > ? \
             ORDER BY `u`.`name` ASC NULLS LAST LIMIT 2) AS `u` LEFT JOIN `posts`"
        ));
        assert!(sql.ends_with("ORDER BY `u`.`name` ASC NULLS LAST"));
        assert_eq!(args, [Value::from(1)]);
    }

    #[test]
    fn test_paging_with_joined_condition_rejected() {
        let err = sqlite_users()
            .include("posts")
            .where_condition(FieldRef::on("Post", "title").equals("x"))
            .limit(1)
            .build_sql()
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidQuery(_)));
    }

    #[test]
    fn test_unknown_include_is_an_error() {
        let err = sqlite_users().include("followers").build_sql().unwrap_err();
        assert!(err.is_resolution());
    }

    // ── Count ─────────────────────────────────────────────────────────

    #[test]
    fn test_count_sql() {
        let q = sqlite_users().select_all().where_condition(field("age").is_not_null());
        assert_eq!(
            q.build_count_sql().unwrap().0,
            "SELECT COUNT(*) FROM `users` WHERE `age` IS NOT NULL"
        );
        assert_eq!(
            sqlite_users().select(["name"]).distinct().build_count_sql().unwrap().0,
            "SELECT COUNT(*) FROM (SELECT DISTINCT `name` FROM `users`) AS `counted`"
        );
        assert_eq!(
            sqlite_users().group_by(["age"]).select_all().build_count_sql().unwrap().0,
            "SELECT COUNT(*) FROM (SELECT `age` FROM `users` GROUP BY `age`) AS `counted`"
        );
    }

    // ── Execution ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_find_many_hydrates_includes() {
        let db = MockDb::new().with_rows(
            vec!["u_id", "u_name", "p_id", "p_user_id"],
            vec![
                vec![Value::from(1), Value::from("Ann"), Value::from(10), Value::from(1)],
                vec![Value::from(1), Value::from("Ann"), Value::from(11), Value::from(1)],
                vec![Value::from(2), Value::from("Bob"), Value::Null, Value::Null],
            ],
        );
        let users = sqlite_users().include("posts").find_many(&db).await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].many("posts").unwrap().len(), 2);
        assert!(users[1].many("posts").unwrap().is_empty());
        assert_eq!(db.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_find_many_plain_maps_columns() {
        let db = MockDb::new().with_rows(
            vec!["id", "user_id", "title"],
            vec![vec![Value::from(3), Value::from(1), Value::from("t")]],
        );
        let posts = Orm::new(registry(), DatabaseBackendType::SQLite)
            .model("Post")
            .find_many(&db)
            .await
            .unwrap();
        assert_eq!(posts[0].get("userId"), Some(&Value::from(1)));
    }

    #[derive(Debug, serde::Deserialize)]
    struct UserRow {
        id: i64,
        name: String,
    }

    #[tokio::test]
    async fn test_find_many_as_and_first() {
        let db = MockDb::new()
            .with_rows(
                vec!["id", "name"],
                vec![vec![Value::from(7), Value::from("Ann")]],
            )
            .with_rows(vec!["id", "name"], Vec::new());
        let typed: Vec<UserRow> = sqlite_users().select_all().find_many_as(&db).await.unwrap();
        assert_eq!(typed[0].id, 7);
        assert_eq!(typed[0].name, "Ann");

        assert!(sqlite_users().find_first(&db).await.unwrap().is_none());
        assert!(db.statements()[1].ends_with("LIMIT 1"));
    }
}
