//! Aggregate SELECTs: `COUNT`, `SUM`, `AVG`, `MIN`, `MAX` with grouping.
//!
//! Aggregates read the model's table without an alias and ignore includes.

use relorm_core::{OrmError, OrmResult};

use super::condition::{Condition, ConditionContext};
use super::model_query::ModelQuery;
use super::{limit_offset_sql, push_clause, render_conditions, Order};
use crate::executor::DbExecutor;
use crate::hydrate;
use crate::record::Record;
use crate::value::Value;

/// An aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    /// `COUNT`
    Count,
    /// `SUM`
    Sum,
    /// `AVG`
    Avg,
    /// `MIN`
    Min,
    /// `MAX`
    Max,
}

impl AggregateFunc {
    /// The SQL function name.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// One selected aggregate; a missing field means `COUNT(*)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    /// The function applied.
    pub func: AggregateFunc,
    /// The field aggregated over.
    pub field: Option<String>,
    /// The result column name.
    pub alias: String,
}

#[derive(Debug, Clone)]
struct AggregationOrder {
    func: AggregateFunc,
    field: Option<String>,
    order: Order,
}

/// An aggregate query on one model.
///
/// Conditions, ordering, grouping, and pagination set on the originating
/// [`ModelQuery`] carry over.
#[derive(Debug, Clone)]
pub struct AggregateQuery {
    base: ModelQuery,
    fields: Vec<String>,
    aggregations: Vec<Aggregation>,
    aggregation_orders: Vec<AggregationOrder>,
}

impl AggregateQuery {
    pub(crate) const fn new(base: ModelQuery) -> Self {
        Self {
            base,
            fields: Vec::new(),
            aggregations: Vec::new(),
            aggregation_orders: Vec::new(),
        }
    }

    fn push(&self, func: AggregateFunc, field: Option<&str>, alias: &str) -> Self {
        let mut next = self.clone();
        next.aggregations.push(Aggregation {
            func,
            field: field.map(str::to_string),
            alias: alias.to_string(),
        });
        next
    }

    /// `COUNT(field) AS alias`.
    #[must_use]
    pub fn count(&self, field: &str, alias: &str) -> Self {
        self.push(AggregateFunc::Count, Some(field), alias)
    }

    /// `COUNT(*) AS alias`.
    #[must_use]
    pub fn count_all(&self, alias: &str) -> Self {
        self.push(AggregateFunc::Count, None, alias)
    }

    /// `SUM(field) AS alias`.
    #[must_use]
    pub fn sum(&self, field: &str, alias: &str) -> Self {
        self.push(AggregateFunc::Sum, Some(field), alias)
    }

    /// `AVG(field) AS alias`.
    #[must_use]
    pub fn avg(&self, field: &str, alias: &str) -> Self {
        self.push(AggregateFunc::Avg, Some(field), alias)
    }

    /// `MIN(field) AS alias`.
    #[must_use]
    pub fn min(&self, field: &str, alias: &str) -> Self {
        self.push(AggregateFunc::Min, Some(field), alias)
    }

    /// `MAX(field) AS alias`.
    #[must_use]
    pub fn max(&self, field: &str, alias: &str) -> Self {
        self.push(AggregateFunc::Max, Some(field), alias)
    }

    /// Selects plain fields next to the aggregates, usually the grouped ones.
    #[must_use]
    pub fn select<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.fields.extend(fields.into_iter().map(Into::into));
        next
    }

    /// Adds GROUP BY fields.
    #[must_use]
    pub fn group_by<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.base.group_by.extend(fields.into_iter().map(Into::into));
        next
    }

    /// Sets the HAVING condition, replacing any earlier one.
    #[must_use]
    pub fn having(&self, condition: Condition) -> Self {
        self.rebase(self.base.having(condition))
    }

    /// Adds a WHERE condition.
    #[must_use]
    pub fn where_condition(&self, condition: Condition) -> Self {
        self.rebase(self.base.where_condition(condition))
    }

    /// Orders by a plain field.
    #[must_use]
    pub fn order_by(&self, field: impl Into<String>, order: Order) -> Self {
        self.rebase(self.base.order_by(field, order))
    }

    /// Orders by an aggregate such as `COUNT(*)`; pass no field for `*`.
    #[must_use]
    pub fn order_by_aggregation(
        &self,
        func: AggregateFunc,
        field: Option<&str>,
        order: Order,
    ) -> Self {
        let mut next = self.clone();
        next.aggregation_orders.push(AggregationOrder {
            func,
            field: field.map(str::to_string),
            order,
        });
        next
    }

    /// Limits the number of result rows.
    #[must_use]
    pub fn limit(&self, limit: u64) -> Self {
        self.rebase(self.base.limit(limit))
    }

    /// Skips the first `offset` result rows.
    #[must_use]
    pub fn offset(&self, offset: u64) -> Self {
        self.rebase(self.base.offset(offset))
    }

    fn rebase(&self, base: ModelQuery) -> Self {
        Self {
            base,
            ..self.clone()
        }
    }

    /// The selected aggregates in order.
    pub fn aggregations(&self) -> &[Aggregation] {
        &self.aggregations
    }

    /// Builds the statement and its arguments.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::NoAggregations`] when neither fields nor
    /// aggregates are selected, and resolution errors for unknown fields.
    pub fn build_sql(&self) -> OrmResult<(String, Vec<Value>)> {
        let base = &self.base;
        let mapper = base.orm.mapper();
        let dialect = base.orm.dialect();
        let column = |field: &str| -> OrmResult<String> {
            Ok(dialect.quote_identifier(&mapper.field_to_column(&base.model, field)?))
        };
        let call = |func: AggregateFunc, field: Option<&String>| -> OrmResult<String> {
            Ok(match field {
                Some(field) => format!("{}({})", func.as_sql(), column(field)?),
                None => format!("{}(*)", func.as_sql()),
            })
        };

        let mut select = self
            .fields
            .iter()
            .map(|f| column(f))
            .collect::<OrmResult<Vec<_>>>()?;
        for agg in &self.aggregations {
            select.push(format!(
                "{} AS {}",
                call(agg.func, agg.field.as_ref())?,
                dialect.quote_identifier(&agg.alias)
            ));
        }
        if select.is_empty() {
            return Err(OrmError::NoAggregations);
        }

        let mut sql = format!(
            "SELECT {} FROM {}",
            select.join(", "),
            dialect.quote_identifier(&mapper.model_to_table(&base.model)?)
        );
        let ctx = ConditionContext::new(mapper, &base.model, "").with_dialect(dialect);
        let (where_sql, mut args) = render_conditions(&base.conditions, &ctx)?;
        push_clause(&mut sql, "WHERE", &where_sql);

        let group_by = base
            .group_by
            .iter()
            .map(|f| column(f))
            .collect::<OrmResult<Vec<_>>>()?;
        push_clause(&mut sql, "GROUP BY", &group_by.join(", "));

        if let Some(having) = &base.having {
            let (having_sql, having_args) = having.render(&ctx)?;
            push_clause(&mut sql, "HAVING", &having_sql);
            args.extend(having_args);
        }

        let mut order = Vec::new();
        for term in &base.order_by {
            order.push(dialect.order_term(&column(&term.field)?, term.order, term.nulls));
        }
        for term in &self.aggregation_orders {
            let expr = call(term.func, term.field.as_ref())?;
            order.push(dialect.order_term(&expr, term.order, None));
        }
        push_clause(&mut sql, "ORDER BY", &order.join(", "));
        push_clause(&mut sql, "", &limit_offset_sql(base.limit, base.offset, dialect));

        Ok((dialect.finalize(sql), args))
    }

    /// Runs the aggregate; each row becomes a record keyed by field name
    /// or aggregate alias.
    pub async fn exec(&self, db: &dyn DbExecutor) -> OrmResult<Vec<Record>> {
        let base = &self.base;
        base.traced("aggregate", async {
            let (sql, args) = self.build_sql()?;
            base.log_statement("aggregate", &sql, &args);
            let mut cursor = db.query(&sql, &args).await?;
            hydrate::scan_plain(base.orm.mapper(), &base.model, &mut *cursor)
        })
        .await
    }

    /// Runs the aggregate and returns the first column of the first row,
    /// or `Null` when there is no row.
    pub async fn scalar(&self, db: &dyn DbExecutor) -> OrmResult<Value> {
        let base = &self.base;
        base.traced("aggregate", async {
            let (sql, args) = self.build_sql()?;
            base.log_statement("aggregate", &sql, &args);
            let mut cursor = db.query(&sql, &args).await?;
            Ok(cursor
                .next_row()?
                .and_then(|row| row.into_values().into_iter().next())
                .unwrap_or(Value::Null))
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

    fn posts(backend: DatabaseBackendType) -> AggregateQuery {
        Orm::new(registry(), backend).model("Post").aggregate()
    }

    #[test]
    fn test_grouped_counts() {
        let (sql, args) = posts(DatabaseBackendType::SQLite)
            .select(["userId"])
            .count_all("total")
            .sum("views", "views")
            .where_condition(field("published").equals(true))
            .group_by(["userId"])
            .build_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT `user_id`, COUNT(*) AS `total`, SUM(`views`) AS `views` FROM `posts` \
             WHERE `published` = ? GROUP BY `user_id`"
        );
        assert_eq!(args, [Value::from(true)]);
    }

    #[test]
    fn test_having_args_follow_where_args() {
        let (sql, args) = posts(DatabaseBackendType::PostgreSQL)
            .select(["userId"])
            .avg("views", "avg_views")
            .where_condition(field("views").greater_than(0))
            .group_by(["userId"])
            .having(field("views").greater_than(10))
            .build_sql()
            .unwrap();
        assert_eq!(
            sql,
            concat!(
                r#"SELECT "user_id", AVG("views") AS "avg_views" FROM "posts" "#,
                r#"WHERE "views" > $1 GROUP BY "user_id" HAVING "views" > $2"#,
            )
        );
        assert_eq!(args, [Value::from(0), Value::from(10)]);
    }

    #[test]
    fn test_order_by_aggregation_and_paging() {
        let (sql, _) = posts(DatabaseBackendType::MySQL)
            .select(["userId"])
            .count_all("n")
            .group_by(["userId"])
            .order_by_aggregation(AggregateFunc::Count, None, Order::Desc)
            .order_by_aggregation(AggregateFunc::Max, Some("views"), Order::Asc)
            .offset(5)
            .build_sql()
            .unwrap();
        assert!(sql.ends_with(
            "ORDER BY COUNT(*) DESC, MAX(`views`) ASC LIMIT 18446744073709551615 OFFSET 5"
        ));
    }

    #[test]
    fn test_nothing_selected() {
        let err = posts(DatabaseBackendType::SQLite).build_sql().unwrap_err();
        assert!(matches!(err, OrmError::NoAggregations));
    }

    #[tokio::test]
    async fn test_exec_maps_columns_and_aliases() {
        let db = MockDb::new().with_rows(
            vec!["user_id", "total"],
            vec![
                vec![Value::from(1), Value::from(3)],
                vec![Value::from(2), Value::from(1)],
            ],
        );
        let rows = posts(DatabaseBackendType::SQLite)
            .select(["userId"])
            .count_all("total")
            .group_by(["userId"])
            .exec(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("userId"), Some(&Value::from(1)));
        assert_eq!(rows[0].get("total"), Some(&Value::from(3)));
    }

    #[tokio::test]
    async fn test_scalar_without_rows_is_null() {
        let db = MockDb::new();
        let value = posts(DatabaseBackendType::SQLite)
            .max("views", "m")
            .scalar(&db)
            .await
            .unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn test_condition_on_other_model_rejected() {
        let err = posts(DatabaseBackendType::SQLite)
            .count_all("n")
            .where_condition(FieldRef::on("User", "name").equals("Ann"))
            .build_sql()
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidQuery(_)));
    }
}
