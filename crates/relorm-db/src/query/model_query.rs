//! The per-model query value.
//!
//! [`ModelQuery`] carries what every statement on a model shares: the
//! conditions, includes, ordering, grouping, and pagination. Statement
//! builders ([`SelectQuery`], [`InsertQuery`], [`UpdateQuery`],
//! [`DeleteQuery`], [`AggregateQuery`]) are derived from it and take what
//! they need.

use std::future::Future;

use indexmap::IndexMap;
use relorm_core::logging::query_span;
use relorm_core::{OrmError, OrmResult, ResultExt};
use serde::de::DeserializeOwned;
use tracing::{debug, Instrument};

use super::aggregate::AggregateQuery;
use super::condition::{self, Condition, FieldRef};
use super::delete::DeleteQuery;
use super::insert::InsertQuery;
use super::join::{JoinClause, JoinPlanner};
use super::select::SelectQuery;
use super::update::UpdateQuery;
use super::{NullsOrder, Order, OrderBy};
use crate::executor::DbExecutor;
use crate::hydrate::IncludeOption;
use crate::orm::Orm;
use crate::record::Record;
use crate::value::Value;

/// An immutable query on one model.
///
/// Every builder method returns a new query; the receiver is unchanged.
///
/// # Examples
///
/// ```
/// use relorm_db::dialect::DatabaseBackendType;
/// use relorm_db::orm::Orm;
/// use relorm_db::query::Order;
/// use relorm_db::schema::{Field, FieldType, ModelSchema, SchemaRegistry};
///
/// let orm = Orm::new(
///     SchemaRegistry::new().with(
///         ModelSchema::new("User")
///             .add_field(Field::new("id", FieldType::Int).primary_key())
///             .add_field(Field::new("age", FieldType::Int)),
///     ),
///     DatabaseBackendType::SQLite,
/// );
///
/// let adults = orm.model("User").where_field("age").greater_than_or_equal(18);
/// let base = orm.model("User");
/// let query = base.where_condition(adults).order_by("age", Order::Desc).limit(10);
///
/// let (sql, _) = query.build_sql().unwrap();
/// assert_eq!(
///     sql,
///     "SELECT `u`.* FROM `users` AS `u` WHERE `u`.`age` >= ? \
///      ORDER BY `u`.`age` DESC NULLS LAST LIMIT 10"
/// );
/// // The base query is untouched.
/// assert_eq!(base.build_sql().unwrap().0, "SELECT `u`.* FROM `users` AS `u`");
/// ```
#[derive(Debug, Clone)]
pub struct ModelQuery {
    pub(crate) orm: Orm,
    pub(crate) model: String,
    pub(crate) alias: String,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) includes: IndexMap<String, IncludeOption>,
    pub(crate) order_by: Vec<OrderBy>,
    pub(crate) group_by: Vec<String>,
    pub(crate) having: Option<Condition>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
}

impl ModelQuery {
    pub(crate) fn new(orm: Orm, model: String) -> Self {
        let alias = model
            .chars()
            .next()
            .map_or_else(|| "t".to_string(), |c| c.to_lowercase().collect());
        Self {
            orm,
            model,
            alias,
            conditions: Vec::new(),
            includes: IndexMap::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            having: None,
            limit: None,
            offset: None,
        }
    }

    fn with(&self, change: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        change(&mut next);
        next
    }

    /// The model name.
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// The alias of the model's table in selects.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The ORM this query was built from.
    pub const fn orm(&self) -> &Orm {
        &self.orm
    }

    /// Starts a condition on a field of this model.
    ///
    /// The field stays bound to this model, so the condition can be combined
    /// with conditions on other models.
    pub fn where_field(&self, name: impl Into<String>) -> FieldRef {
        FieldRef::on(self.model.clone(), name)
    }

    /// Adds a condition; several conditions are combined with AND.
    #[must_use]
    pub fn where_condition(&self, condition: Condition) -> Self {
        self.with(|q| q.conditions.push(condition))
    }

    /// Adds a raw SQL condition.
    #[must_use]
    pub fn where_raw(&self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        self.where_condition(condition::raw(sql, args))
    }

    /// Eagerly loads a relation path such as `posts` or `posts.comments`.
    ///
    /// Paths are checked and joined when SQL is built.
    #[must_use]
    pub fn include(&self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.with(|q| {
            q.includes
                .entry(path.clone())
                .or_insert_with(|| IncludeOption::new(path));
        })
    }

    /// Eagerly loads a relation path with post-hydration directives.
    #[must_use]
    pub fn include_with(&self, option: IncludeOption) -> Self {
        self.with(|q| {
            q.includes.insert(option.path.clone(), option);
        })
    }

    /// Appends a sort term.
    #[must_use]
    pub fn order_by(&self, field: impl Into<String>, order: Order) -> Self {
        self.order_by_term(OrderBy::new(field, order))
    }

    /// Appends a sort term with explicit NULL placement.
    #[must_use]
    pub fn order_by_nulls(
        &self,
        field: impl Into<String>,
        order: Order,
        nulls: NullsOrder,
    ) -> Self {
        self.order_by_term(OrderBy::new(field, order).nulls(nulls))
    }

    /// Appends a prepared sort term.
    #[must_use]
    pub fn order_by_term(&self, term: OrderBy) -> Self {
        self.with(|q| q.order_by.push(term))
    }

    /// Sets the GROUP BY fields.
    #[must_use]
    pub fn group_by<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.with(|q| q.group_by = fields)
    }

    /// Sets the HAVING condition.
    #[must_use]
    pub fn having(&self, condition: Condition) -> Self {
        self.with(|q| q.having = Some(condition))
    }

    /// Caps the number of rows.
    #[must_use]
    pub fn limit(&self, limit: u64) -> Self {
        self.with(|q| q.limit = Some(limit))
    }

    /// Skips leading rows.
    #[must_use]
    pub fn offset(&self, offset: u64) -> Self {
        self.with(|q| q.offset = Some(offset))
    }

    // ── Statements ────────────────────────────────────────────────────

    /// A select of the given fields; none selects every column.
    pub fn select<I, S>(&self, fields: I) -> SelectQuery
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SelectQuery::new(self.clone(), fields.into_iter().map(Into::into).collect())
    }

    /// A select of every column.
    pub fn select_all(&self) -> SelectQuery {
        SelectQuery::new(self.clone(), Vec::new())
    }

    /// An insert of one record; add rows with [`InsertQuery::values`].
    pub fn insert(&self, data: Record) -> InsertQuery {
        InsertQuery::new(self.clone(), vec![data])
    }

    /// An insert of several records.
    pub fn insert_many(&self, rows: Vec<Record>) -> InsertQuery {
        InsertQuery::new(self.clone(), rows)
    }

    /// An update assigning the fields of `data` to the matching rows.
    pub fn update(&self, data: Record) -> UpdateQuery {
        UpdateQuery::new(self.clone(), data)
    }

    /// A delete of the matching rows.
    pub fn delete(&self) -> DeleteQuery {
        DeleteQuery::new(self.clone())
    }

    /// An aggregate over the matching rows.
    pub fn aggregate(&self) -> AggregateQuery {
        AggregateQuery::new(self.clone())
    }

    /// Builds the SELECT statement for every column.
    ///
    /// # Errors
    ///
    /// Returns resolution errors for unknown names and construction errors
    /// for invalid include paths.
    pub fn build_sql(&self) -> OrmResult<(String, Vec<Value>)> {
        self.select_all().build_sql()
    }

    // ── Execution ─────────────────────────────────────────────────────

    /// Fetches every matching record, with includes hydrated.
    pub async fn find_many(&self, db: &dyn DbExecutor) -> OrmResult<Vec<Record>> {
        self.select_all().find_many(db).await
    }

    /// Fetches every matching record into a typed struct.
    pub async fn find_many_as<T: DeserializeOwned>(
        &self,
        db: &dyn DbExecutor,
    ) -> OrmResult<Vec<T>> {
        self.select_all().find_many_as(db).await
    }

    /// Fetches the first matching record, if any.
    pub async fn find_first(&self, db: &dyn DbExecutor) -> OrmResult<Option<Record>> {
        self.select_all().find_first(db).await
    }

    /// Fetches the single matching record.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::DoesNotExist`] when nothing matches and
    /// [`OrmError::MultipleObjectsReturned`] when more than one row does.
    pub async fn find_unique(&self, db: &dyn DbExecutor) -> OrmResult<Record> {
        let model = self.model.clone();
        let mut records = self.limit(2).find_many(db).await?;
        match records.len() {
            0 => Err(OrmError::DoesNotExist(format!(
                "{model} matching query does not exist"
            ))),
            1 => Ok(records.remove(0)),
            _ => Err(OrmError::MultipleObjectsReturned(format!(
                "find_unique on {model} matched more than one row"
            ))),
        }
    }

    /// Counts the matching rows.
    pub async fn count(&self, db: &dyn DbExecutor) -> OrmResult<i64> {
        self.select_all().count(db).await
    }

    /// Returns `true` if any row matches.
    pub async fn exists(&self, db: &dyn DbExecutor) -> OrmResult<bool> {
        Ok(self.count(db).await? > 0)
    }

    /// `SUM(field)`; `None` when no rows match.
    pub async fn sum(&self, db: &dyn DbExecutor, field: &str) -> OrmResult<Option<f64>> {
        Ok(self.aggregate().sum(field, "result").scalar(db).await?.as_float())
    }

    /// `AVG(field)`; `None` when no rows match.
    pub async fn avg(&self, db: &dyn DbExecutor, field: &str) -> OrmResult<Option<f64>> {
        Ok(self.aggregate().avg(field, "result").scalar(db).await?.as_float())
    }

    /// `MIN(field)`; `Null` when no rows match.
    pub async fn min(&self, db: &dyn DbExecutor, field: &str) -> OrmResult<Value> {
        self.aggregate().min(field, "result").scalar(db).await
    }

    /// `MAX(field)`; `Null` when no rows match.
    pub async fn max(&self, db: &dyn DbExecutor, field: &str) -> OrmResult<Value> {
        self.aggregate().max(field, "result").scalar(db).await
    }

    // ── Shared plumbing ───────────────────────────────────────────────

    /// Plans the joins every include needs, in include order.
    pub(crate) fn plan_joins(&self) -> OrmResult<Vec<JoinClause>> {
        let options = self.orm.options();
        let mut planner = JoinPlanner::new(self.orm.mapper(), self.alias.clone());
        for path in self.includes.keys() {
            let segments: Vec<&str> = path.split('.').collect();
            if segments.iter().any(|s| s.is_empty()) {
                return Err(OrmError::InvalidQuery(format!(
                    "invalid include path '{path}'"
                )));
            }
            if segments.len() > options.max_include_depth {
                return Err(OrmError::InvalidQuery(format!(
                    "include path '{path}' is deeper than {} relations",
                    options.max_include_depth
                )));
            }
            planner.add_nested_join(&self.alias, &self.model, &segments, options.default_join)?;
        }
        Ok(planner.into_joins())
    }

    /// Emits a built statement when SQL logging is on.
    pub(crate) fn log_statement(&self, operation: &str, sql: &str, args: &[Value]) {
        if self.orm.options().log_sql {
            debug!(model = %self.model, operation, sql, args = args.len(), "built statement");
        }
    }

    /// Runs `work` inside the query span and names the operation on error.
    pub(crate) async fn traced<T>(
        &self,
        operation: &str,
        work: impl Future<Output = OrmResult<T>>,
    ) -> OrmResult<T> {
        work.instrument(query_span(&self.model, operation))
            .await
            .context(format!("{operation} {}", self.model))
    }
}
