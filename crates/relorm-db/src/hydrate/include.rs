//! Post-hydration shaping of included relations.
//!
//! An [`IncludeOption`] names a relation path and the filter, ordering,
//! pagination, and field subset to apply to that relation's records once
//! they have been hydrated. Nothing here changes the SQL: a limit on an
//! include limits what the caller sees, not what is joined.

use std::cmp::Ordering;

use indexmap::IndexMap;
use relorm_core::OrmResult;

use crate::query::condition::Condition;
use crate::query::evaluator::evaluate;
use crate::query::{NullsOrder, Order, OrderBy};
use crate::record::{Record, Related};
use crate::schema::ModelSchema;
use crate::value::Value;

/// Directives for one included relation path.
///
/// # Examples
///
/// ```
/// use relorm_db::hydrate::IncludeOption;
/// use relorm_db::query::{field, OrderBy};
///
/// let recent = IncludeOption::new("posts")
///     .filter(field("published").equals(true))
///     .order_by(OrderBy::desc("id"))
///     .limit(3);
/// assert_eq!(recent.path, "posts");
/// assert_eq!(recent.limit, Some(3));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludeOption {
    /// The dot-separated relation path, e.g. `posts.comments`.
    pub path: String,
    /// Fields to keep; empty keeps all. Primary keys are always kept.
    pub select: Vec<String>,
    /// Records failing this condition are dropped.
    pub filter: Option<Condition>,
    /// Sort terms, applied in order.
    pub order_by: Vec<OrderBy>,
    /// Maximum number of records kept.
    pub limit: Option<usize>,
    /// Number of leading records skipped.
    pub offset: Option<usize>,
}

impl IncludeOption {
    /// An include of `path` with no directives.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Keeps only the named fields.
    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Filters the related records.
    #[must_use]
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(condition);
        self
    }

    /// Appends a sort term.
    #[must_use]
    pub fn order_by(mut self, term: OrderBy) -> Self {
        self.order_by.push(term);
        self
    }

    /// Caps the number of related records.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips leading related records.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns `true` if applying the option would change nothing.
    pub fn is_noop(&self) -> bool {
        self.select.is_empty()
            && self.filter.is_none()
            && self.order_by.is_empty()
            && self.limit.is_none()
            && self.offset.is_none()
    }
}

/// Applies include options to hydrated relations, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct IncludeProcessor {
    options: IndexMap<String, IncludeOption>,
}

impl IncludeProcessor {
    /// Collects the options, later ones replacing earlier ones for the same
    /// path.
    pub fn new(options: impl IntoIterator<Item = IncludeOption>) -> Self {
        Self {
            options: options.into_iter().map(|o| (o.path.clone(), o)).collect(),
        }
    }

    /// The option registered for `path`, if any.
    pub fn option(&self, path: &str) -> Option<&IncludeOption> {
        self.options.get(path)
    }

    /// Shapes one hydrated relation at `path`. A to-one relation is treated
    /// as a list of zero or one records.
    ///
    /// # Errors
    ///
    /// Propagates evaluation errors from the filter.
    pub fn apply(&self, path: &str, schema: &ModelSchema, related: Related) -> OrmResult<Related> {
        let Some(option) = self.option(path).filter(|o| !o.is_noop()) else {
            return Ok(related);
        };
        Ok(match related {
            Related::Many(records) => Related::Many(process(option, schema, records)?),
            Related::One(Some(record)) => Related::One(
                process(option, schema, vec![*record])?
                    .into_iter()
                    .next()
                    .map(Box::new),
            ),
            Related::One(None) => Related::One(None),
        })
    }
}

/// Filters, sorts, paginates, and projects `records`.
///
/// # Errors
///
/// Propagates evaluation errors from the filter.
pub fn process(
    option: &IncludeOption,
    schema: &ModelSchema,
    records: Vec<Record>,
) -> OrmResult<Vec<Record>> {
    let mut records = match &option.filter {
        Some(condition) => {
            let mut kept = Vec::with_capacity(records.len());
            for record in records {
                if evaluate(condition, &record)? {
                    kept.push(record);
                }
            }
            kept
        }
        None => records,
    };

    if !option.order_by.is_empty() {
        records.sort_by(|a, b| compare_records(a, b, &option.order_by));
    }

    let records = records
        .into_iter()
        .skip(option.offset.unwrap_or(0))
        .take(option.limit.unwrap_or(usize::MAX));

    if option.select.is_empty() {
        return Ok(records.collect());
    }
    let pk_fields: Vec<&str> = schema
        .primary_key_fields()
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    Ok(records
        .map(|mut record| {
            record.retain_fields(|name| {
                pk_fields.contains(&name) || option.select.iter().any(|s| s == name)
            });
            record
        })
        .collect())
}

fn compare_records(a: &Record, b: &Record, terms: &[OrderBy]) -> Ordering {
    for term in terms {
        let ord = compare_term(a.get(&term.field), b.get(&term.field), term);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

// NULLs sort last unless placed explicitly, as in the SQL the dialects emit.
fn compare_term(a: Option<&Value>, b: Option<&Value>, term: &OrderBy) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    let nulls = term.nulls.unwrap_or(NullsOrder::Last);
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => match nulls {
            NullsOrder::First => Ordering::Less,
            NullsOrder::Last => Ordering::Greater,
        },
        (Some(_), None) => match nulls {
            NullsOrder::First => Ordering::Greater,
            NullsOrder::Last => Ordering::Less,
        },
        (Some(a), Some(b)) => {
            let ord = a.compare(b).unwrap_or(Ordering::Equal);
            match term.order {
                Order::Asc => ord,
                Order::Desc => ord.reverse(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::condition::field;
    use crate::schema::FieldMapper;
    use crate::testing::registry;

    fn post(id: i64, title: &str, views: Option<i64>) -> Record {
        Record::new()
            .with("id", id)
            .with("title", title)
            .with("views", views)
    }

    fn posts() -> Vec<Record> {
        vec![
            post(1, "a", Some(5)),
            post(2, "b", None),
            post(3, "c", Some(9)),
            post(4, "d", Some(1)),
        ]
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records
            .iter()
            .map(|r| match r.get("id") {
                Some(Value::Int(i)) => *i,
                other => panic!("unexpected id {other:?}"),
            })
            .collect()
    }

    // ── Sorting ───────────────────────────────────────────────────────

    #[test]
    fn test_sort_asc_nulls_last() {
        let reg = registry();
        let schema = reg.schema("Post").unwrap();
        let opt = IncludeOption::new("posts").order_by(OrderBy::asc("views"));
        assert_eq!(ids(&process(&opt, schema, posts()).unwrap()), [4, 1, 3, 2]);
    }

    #[test]
    fn test_sort_desc_nulls_still_last() {
        let reg = registry();
        let schema = reg.schema("Post").unwrap();
        let opt = IncludeOption::new("posts").order_by(OrderBy::desc("views"));
        assert_eq!(ids(&process(&opt, schema, posts()).unwrap()), [3, 1, 4, 2]);
    }

    #[test]
    fn test_sort_explicit_nulls() {
        let reg = registry();
        let schema = reg.schema("Post").unwrap();
        let opt = IncludeOption::new("posts")
            .order_by(OrderBy::desc("views").nulls(NullsOrder::First));
        assert_eq!(ids(&process(&opt, schema, posts()).unwrap()), [2, 3, 1, 4]);
    }

    // ── Filtering and pagination ──────────────────────────────────────

    #[test]
    fn test_filter_then_paginate() {
        let reg = registry();
        let schema = reg.schema("Post").unwrap();
        let opt = IncludeOption::new("posts")
            .filter(field("views").greater_than(0))
            .order_by(OrderBy::asc("id"))
            .offset(1)
            .limit(1);
        assert_eq!(ids(&process(&opt, schema, posts()).unwrap()), [3]);
    }

    #[test]
    fn test_filter_raw_condition_errors() {
        let reg = registry();
        let schema = reg.schema("Post").unwrap();
        let opt = IncludeOption::new("posts")
            .filter(crate::query::condition::raw("views > ?", vec![Value::from(1)]));
        assert!(process(&opt, schema, posts()).is_err());
    }

    #[test]
    fn test_select_keeps_primary_key() {
        let reg = registry();
        let schema = reg.schema("Post").unwrap();
        let opt = IncludeOption::new("posts").select(["title"]);
        let out = process(&opt, schema, posts()).unwrap();
        assert_eq!(out[0].field_names().collect::<Vec<_>>(), ["id", "title"]);
    }

    // ── Processor ─────────────────────────────────────────────────────

    #[test]
    fn test_apply_to_one_relation() {
        let reg = registry();
        let schema = reg.schema("User").unwrap();
        let processor = IncludeProcessor::new([
            IncludeOption::new("author").filter(field("name").equals("Ann"))
        ]);
        let bob = Related::One(Some(Box::new(Record::new().with("id", 1).with("name", "Bob"))));
        assert_eq!(
            processor.apply("author", schema, bob).unwrap(),
            Related::One(None)
        );
    }

    #[test]
    fn test_apply_without_option_is_identity() {
        let reg = registry();
        let schema = reg.schema("Post").unwrap();
        let processor = IncludeProcessor::new([IncludeOption::new("posts")]);
        let related = Related::Many(posts());
        assert_eq!(
            processor.apply("posts", schema, related.clone()).unwrap(),
            related
        );
        assert_eq!(
            processor.apply("other", schema, related.clone()).unwrap(),
            related
        );
    }
}
