//! # relorm-db
//!
//! Database-agnostic query construction and result hydration. Queries are
//! built against a logical [`schema`] and rendered for a [`dialect`]; rows
//! come back through a [`DbExecutor`] and are hydrated into nested
//! [`Record`]s.
//!
//! ## Architecture
//!
//! An [`Orm`] pairs a [`FieldMapper`](schema::FieldMapper) with a
//! [`Dialect`](dialect::Dialect). [`Orm::model`] starts an immutable
//! [`ModelQuery`]; chained calls return new queries and SQL is rendered only
//! by `build_sql` or an execution method. Includes are planned into LEFT
//! JOINs with allocated aliases, and the joined rows are folded back into
//! one record per root row by the scanners in [`hydrate`].
//!
//! ## Module Overview
//!
//! - [`schema`] - models, fields, relations, and the field mapper
//! - [`dialect`] - per-backend SQL differences
//! - [`query`] - conditions, join planning, and statement assemblers
//! - [`hydrate`] - column resolution, scanners, and include post-processing
//! - [`executor`] - the backend boundary and row cursors
//! - [`record`], [`row`], [`value`] - data carried in and out

// These clippy lints are intentionally allowed for the query crate:
// - too_many_lines: statement assembly reads best as one function per statement
// - format_push_string: format! with push_str is clearer than write! for SQL generation
// - doc_markdown: SQL keywords in docs trip the backtick check
// - return_self_not_must_use: builder methods carry #[must_use] where it matters
// - module_name_repetitions: `query::ModelQuery` and friends read naturally
#![allow(clippy::too_many_lines)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::future_not_send)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::result_large_err)]

pub mod dialect;
pub mod executor;
pub mod hydrate;
pub mod orm;
pub mod query;
pub mod record;
pub mod row;
pub mod schema;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

// Re-export the most commonly used types at the crate root.
pub use dialect::{DatabaseBackendType, Dialect};
pub use executor::{DbExecutor, ExecResult, RowCursor, RowSet};
pub use hydrate::IncludeOption;
pub use orm::{Orm, QueryOptions};
pub use query::{
    and, field, not, or, AggregateQuery, Condition, ConflictAction, DeleteQuery, InsertQuery,
    ModelQuery, NullsOrder, Order, OrderBy, RawQuery, SelectQuery, UpdateQuery,
};
pub use record::{Record, Related};
pub use row::Row;
pub use schema::{
    Field, FieldMapper, FieldType, ModelSchema, Relation, RelationKind, SchemaRegistry,
};
pub use value::Value;
