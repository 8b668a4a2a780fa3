//! Query building and execution.
//!
//! Every builder here is an immutable value: chained calls return a new
//! query and leave the receiver untouched, so a partially built query can be
//! shared and extended in several directions.
//!
//! - [`condition`] - the condition tree and its SQL rendering
//! - [`evaluator`] - in-memory evaluation of conditions against records
//! - [`join`] - alias allocation and join planning for includes
//! - [`model_query`] - the per-model entry point
//! - [`select`], [`insert`], [`update`], [`delete`], [`aggregate`] - statement assemblers
//! - [`raw`] - verbatim SQL

pub mod aggregate;
pub mod condition;
pub mod delete;
pub mod evaluator;
pub mod insert;
pub mod join;
pub mod model_query;
pub mod raw;
pub mod select;
pub mod update;

use relorm_core::OrmResult;

pub use aggregate::{AggregateFunc, AggregateQuery, Aggregation};
pub use condition::{and, field, not, or, raw, Condition, ConditionContext, FieldRef, Lookup};
pub use delete::DeleteQuery;
pub use insert::{ConflictAction, InsertQuery};
pub use join::{JoinClause, JoinKind, JoinPlanner, JoinPredicate};
pub use model_query::ModelQuery;
pub use raw::RawQuery;
pub use select::SelectQuery;
pub use update::{Assignment, UpdateQuery};

use crate::dialect::Dialect;
use crate::value::Value;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Order {
    /// The SQL keyword.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Where NULLs sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullsOrder {
    /// Before all non-null values.
    First,
    /// After all non-null values.
    Last,
}

/// One ORDER BY term on a logical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// The logical field name.
    pub field: String,
    /// The direction.
    pub order: Order,
    /// Explicit NULL placement; `None` uses the dialect default.
    pub nulls: Option<NullsOrder>,
}

impl OrderBy {
    /// Orders by `field` in the given direction.
    pub fn new(field: impl Into<String>, order: Order) -> Self {
        Self {
            field: field.into(),
            order,
            nulls: None,
        }
    }

    /// `field ASC`
    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, Order::Asc)
    }

    /// `field DESC`
    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, Order::Desc)
    }

    /// Places NULLs explicitly.
    #[must_use]
    pub fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }
}

/// Renders a list of conditions joined by AND.
///
/// A single condition is emitted as-is; several are each parenthesized so
/// an OR inside one cannot bind across another.
pub(crate) fn render_conditions(
    conditions: &[Condition],
    ctx: &ConditionContext<'_>,
) -> OrmResult<(String, Vec<Value>)> {
    let mut parts = Vec::with_capacity(conditions.len());
    let mut args = Vec::new();
    for condition in conditions {
        let (sql, cond_args) = condition.render(ctx)?;
        if !sql.is_empty() {
            parts.push(sql);
            args.extend(cond_args);
        }
    }
    let sql = match parts.len() {
        0 => String::new(),
        1 => parts.remove(0),
        _ => parts
            .iter()
            .map(|p| format!("({p})"))
            .collect::<Vec<_>>()
            .join(" AND "),
    };
    Ok((sql, args))
}

/// Appends ` KEYWORD body` to `sql` unless `body` is empty.
pub(crate) fn push_clause(sql: &mut String, keyword: &str, body: &str) {
    if body.is_empty() {
        return;
    }
    sql.push(' ');
    if !keyword.is_empty() {
        sql.push_str(keyword);
        sql.push(' ');
    }
    sql.push_str(body);
}

/// Renders `LIMIT`/`OFFSET`, adding the dialect's maximum LIMIT when an
/// OFFSET needs one.
pub(crate) fn limit_offset_sql(
    limit: Option<u64>,
    offset: Option<u64>,
    dialect: &dyn Dialect,
) -> String {
    match (limit, offset) {
        (Some(limit), Some(offset)) => format!("LIMIT {limit} OFFSET {offset}"),
        (Some(limit), None) => format!("LIMIT {limit}"),
        (None, Some(offset)) if dialect.requires_limit_for_offset() => {
            format!("LIMIT {} OFFSET {offset}", dialect.max_limit())
        }
        (None, Some(offset)) => format!("OFFSET {offset}"),
        (None, None) => String::new(),
    }
}

/// Quotes and comma-joins the columns of `fields` for a RETURNING clause.
pub(crate) fn returning_sql(
    fields: &[String],
    model: &str,
    mapper: &dyn crate::schema::FieldMapper,
    dialect: &dyn Dialect,
) -> OrmResult<String> {
    let columns = mapper.fields_to_columns(model, fields)?;
    Ok(format!(
        " RETURNING {}",
        columns
            .iter()
            .map(|c| dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    ))
}
