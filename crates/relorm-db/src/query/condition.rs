//! Composable filter conditions.
//!
//! A [`Condition`] is an immutable boolean expression tree. Leaves compare a
//! logical field against literal values; [`And`](Condition::And),
//! [`Or`](Condition::Or) and [`Not`](Condition::Not) combine them, and
//! [`Raw`](Condition::Raw) embeds a SQL fragment verbatim.
//!
//! Field names are resolved to columns when the tree is rendered, not when it
//! is built, so one tree can be rendered against different aliases and
//! dialects. Conditions combine with `&`, `|` and `!`:
//!
//! ```
//! use relorm_db::query::condition::{field, Condition};
//!
//! let adults = field("age").greater_than_or_equal(18);
//! let named = field("name").starts_with("A");
//! let cond = (adults & named) | !field("email").is_null();
//! assert!(matches!(cond, Condition::Or(_)));
//! ```

use std::ops::{BitAnd, BitOr, Not};

use relorm_core::{OrmError, OrmResult};

use crate::dialect::Dialect;
use crate::schema::FieldMapper;
use crate::value::Value;

/// A comparison applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// `=`; comparing with `Null` renders `IS NULL`.
    Eq(Value),
    /// `!=`; comparing with `Null` renders `IS NOT NULL`.
    Ne(Value),
    /// `>`
    Gt(Value),
    /// `>=`
    Gte(Value),
    /// `<`
    Lt(Value),
    /// `<=`
    Lte(Value),
    /// `LIKE` with a SQL pattern.
    Like(String),
    /// `NOT LIKE` with a SQL pattern.
    NotLike(String),
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
    /// `BETWEEN low AND high`, inclusive.
    Between(Value, Value),
    /// `IN (...)`; an empty list never matches.
    In(Vec<Value>),
    /// `NOT IN (...)`; an empty list always matches.
    NotIn(Vec<Value>),
}

/// A field comparison leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// The model the field belongs to; `None` means the model being queried.
    pub model: Option<String>,
    /// The logical field name.
    pub field: String,
    /// The comparison.
    pub lookup: Lookup,
}

/// A boolean expression tree over model fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A single field comparison.
    Compare(Comparison),
    /// All children must hold. An empty list renders nothing.
    And(Vec<Condition>),
    /// Any child must hold. An empty list renders nothing.
    Or(Vec<Condition>),
    /// The child must not hold.
    Not(Box<Condition>),
    /// A literal SQL fragment with `?` placeholders.
    Raw {
        /// The SQL text.
        sql: String,
        /// Arguments for the placeholders in `sql`.
        args: Vec<Value>,
    },
}

/// Starts a comparison on a field of the queried model.
pub fn field(name: impl Into<String>) -> FieldRef {
    FieldRef::new(name)
}

/// Combines conditions with AND.
pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Condition {
    Condition::And(conditions.into_iter().collect())
}

/// Combines conditions with OR.
pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Condition {
    Condition::Or(conditions.into_iter().collect())
}

/// Negates a condition.
pub fn not(condition: Condition) -> Condition {
    Condition::Not(Box::new(condition))
}

/// A raw SQL condition.
pub fn raw(sql: impl Into<String>, args: Vec<Value>) -> Condition {
    Condition::Raw {
        sql: sql.into(),
        args,
    }
}

/// A field awaiting a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    model: Option<String>,
    name: String,
}

impl FieldRef {
    /// A field of the queried model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            model: None,
            name: name.into(),
        }
    }

    /// A field of an explicitly named model, resolved against that model's
    /// schema when rendered.
    pub fn on(model: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            name: name.into(),
        }
    }

    /// The logical field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn compare(&self, lookup: Lookup) -> Condition {
        Condition::Compare(Comparison {
            model: self.model.clone(),
            field: self.name.clone(),
            lookup,
        })
    }

    /// `field = value`
    pub fn equals(&self, value: impl Into<Value>) -> Condition {
        self.compare(Lookup::Eq(value.into()))
    }

    /// `field != value`
    pub fn not_equals(&self, value: impl Into<Value>) -> Condition {
        self.compare(Lookup::Ne(value.into()))
    }

    /// `field > value`
    pub fn greater_than(&self, value: impl Into<Value>) -> Condition {
        self.compare(Lookup::Gt(value.into()))
    }

    /// `field >= value`
    pub fn greater_than_or_equal(&self, value: impl Into<Value>) -> Condition {
        self.compare(Lookup::Gte(value.into()))
    }

    /// `field < value`
    pub fn less_than(&self, value: impl Into<Value>) -> Condition {
        self.compare(Lookup::Lt(value.into()))
    }

    /// `field <= value`
    pub fn less_than_or_equal(&self, value: impl Into<Value>) -> Condition {
        self.compare(Lookup::Lte(value.into()))
    }

    /// `field LIKE pattern`
    pub fn like(&self, pattern: impl Into<String>) -> Condition {
        self.compare(Lookup::Like(pattern.into()))
    }

    /// `field NOT LIKE pattern`
    pub fn not_like(&self, pattern: impl Into<String>) -> Condition {
        self.compare(Lookup::NotLike(pattern.into()))
    }

    /// `field LIKE '%value%'`
    pub fn contains(&self, value: &str) -> Condition {
        self.like(format!("%{value}%"))
    }

    /// `field LIKE 'value%'`
    pub fn starts_with(&self, value: &str) -> Condition {
        self.like(format!("{value}%"))
    }

    /// `field LIKE '%value'`
    pub fn ends_with(&self, value: &str) -> Condition {
        self.like(format!("%{value}"))
    }

    /// `field IS NULL`
    pub fn is_null(&self) -> Condition {
        self.compare(Lookup::IsNull)
    }

    /// `field IS NOT NULL`
    pub fn is_not_null(&self) -> Condition {
        self.compare(Lookup::IsNotNull)
    }

    /// `field BETWEEN low AND high`
    pub fn between(&self, low: impl Into<Value>, high: impl Into<Value>) -> Condition {
        self.compare(Lookup::Between(low.into(), high.into()))
    }

    /// `field IN (...)`
    pub fn in_list<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Condition {
        self.compare(Lookup::In(values.into_iter().map(Into::into).collect()))
    }

    /// `field NOT IN (...)`
    pub fn not_in<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Condition {
        self.compare(Lookup::NotIn(values.into_iter().map(Into::into).collect()))
    }
}

/// What a condition needs to render itself.
#[derive(Debug, Clone)]
pub struct ConditionContext<'a> {
    /// Resolves field names to columns.
    pub mapper: &'a dyn FieldMapper,
    /// The model unqualified leaves belong to.
    pub model: &'a str,
    /// The alias prefixed to columns; empty for none.
    pub alias: &'a str,
    /// Quotes identifiers when present.
    pub dialect: Option<&'a dyn Dialect>,
    joined: Vec<(String, String)>,
}

impl<'a> ConditionContext<'a> {
    /// A context for `model` under `alias`, without identifier quoting.
    pub fn new(mapper: &'a dyn FieldMapper, model: &'a str, alias: &'a str) -> Self {
        Self {
            mapper,
            model,
            alias,
            dialect: None,
            joined: Vec::new(),
        }
    }

    /// Quotes identifiers with the given dialect.
    #[must_use]
    pub fn with_dialect(mut self, dialect: &'a dyn Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Registers the alias of a joined model, used for leaves naming that
    /// model explicitly.
    #[must_use]
    pub fn with_joined(mut self, model: impl Into<String>, alias: impl Into<String>) -> Self {
        self.joined.push((model.into(), alias.into()));
        self
    }

    fn quote(&self, ident: &str) -> String {
        self.dialect
            .map_or_else(|| ident.to_string(), |d| d.quote_identifier(ident))
    }

    /// Resolves a leaf's field to a (possibly aliased, quoted) column.
    fn column_for(&self, model: Option<&str>, field: &str) -> OrmResult<String> {
        let model = model.unwrap_or(self.model);
        let column = self.quote(&self.mapper.field_to_column(model, field)?);

        let alias = if model == self.model {
            self.alias
        } else {
            self.joined
                .iter()
                .find(|(m, _)| m == model)
                .map(|(_, a)| a.as_str())
                .ok_or_else(|| {
                    OrmError::InvalidQuery(format!(
                        "condition on {model}, which is not joined into the {} query",
                        self.model
                    ))
                })?
        };
        Ok(if alias.is_empty() {
            column
        } else {
            format!("{}.{column}", self.quote(alias))
        })
    }
}

impl Condition {
    /// Renders the condition to SQL with `?` placeholders and its arguments.
    ///
    /// An empty result means "no condition".
    ///
    /// # Errors
    ///
    /// Returns an error if a leaf names an unknown model, or a model that
    /// is neither the context model nor joined into it.
    pub fn render(&self, ctx: &ConditionContext<'_>) -> OrmResult<(String, Vec<Value>)> {
        match self {
            Self::Compare(cmp) => render_comparison(cmp, ctx),
            Self::And(children) => render_group(children, " AND ", ctx),
            Self::Or(children) => render_group(children, " OR ", ctx),
            Self::Not(child) => {
                let (sql, args) = child.render(ctx)?;
                if sql.is_empty() {
                    return Ok((String::new(), Vec::new()));
                }
                Ok((format!("NOT ({sql})"), args))
            }
            Self::Raw { sql, args } => Ok((sql.clone(), args.clone())),
        }
    }

    /// Returns `true` if the condition renders to nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => children.iter().all(Self::is_empty),
            Self::Not(child) => child.is_empty(),
            Self::Raw { sql, .. } => sql.is_empty(),
            Self::Compare(_) => false,
        }
    }

    /// Returns `true` if any leaf names a model other than `model`.
    pub fn mentions_other_model(&self, model: &str) -> bool {
        match self {
            Self::Compare(cmp) => cmp.model.as_deref().is_some_and(|m| m != model),
            Self::And(children) | Self::Or(children) => {
                children.iter().any(|c| c.mentions_other_model(model))
            }
            Self::Not(child) => child.mentions_other_model(model),
            Self::Raw { .. } => false,
        }
    }

    /// Combines with AND, flattening nested ANDs.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::And(mut a), Self::And(b)) => {
                a.extend(b);
                Self::And(a)
            }
            (Self::And(mut a), c) => {
                a.push(c);
                Self::And(a)
            }
            (c, Self::And(mut b)) => {
                b.insert(0, c);
                Self::And(b)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    /// Combines with OR, flattening nested ORs.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::Or(mut a), Self::Or(b)) => {
                a.extend(b);
                Self::Or(a)
            }
            (Self::Or(mut a), c) => {
                a.push(c);
                Self::Or(a)
            }
            (c, Self::Or(mut b)) => {
                b.insert(0, c);
                Self::Or(b)
            }
            (a, b) => Self::Or(vec![a, b]),
        }
    }

    /// Wraps in NOT. Double negation is kept as written.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }
}

fn render_group(
    children: &[Condition],
    joiner: &str,
    ctx: &ConditionContext<'_>,
) -> OrmResult<(String, Vec<Value>)> {
    let mut parts = Vec::with_capacity(children.len());
    let mut args = Vec::new();
    for child in children {
        let (sql, child_args) = child.render(ctx)?;
        if !sql.is_empty() {
            parts.push(format!("({sql})"));
            args.extend(child_args);
        }
    }
    Ok((parts.join(joiner), args))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn render_comparison(
    cmp: &Comparison,
    ctx: &ConditionContext<'_>,
) -> OrmResult<(String, Vec<Value>)> {
    let col = ctx.column_for(cmp.model.as_deref(), &cmp.field)?;
    let binary = |op: &str, v: &Value| (format!("{col} {op} ?"), vec![v.clone()]);

    Ok(match &cmp.lookup {
        Lookup::Eq(Value::Null) | Lookup::IsNull => (format!("{col} IS NULL"), Vec::new()),
        Lookup::Ne(Value::Null) | Lookup::IsNotNull => {
            (format!("{col} IS NOT NULL"), Vec::new())
        }
        Lookup::Eq(v) => binary("=", v),
        Lookup::Ne(v) => binary("!=", v),
        Lookup::Gt(v) => binary(">", v),
        Lookup::Gte(v) => binary(">=", v),
        Lookup::Lt(v) => binary("<", v),
        Lookup::Lte(v) => binary("<=", v),
        Lookup::Like(p) => (format!("{col} LIKE ?"), vec![Value::from(p.as_str())]),
        Lookup::NotLike(p) => (format!("{col} NOT LIKE ?"), vec![Value::from(p.as_str())]),
        Lookup::Between(lo, hi) => (
            format!("{col} BETWEEN ? AND ?"),
            vec![lo.clone(), hi.clone()],
        ),
        Lookup::In(values) if values.is_empty() => ("1 = 0".to_string(), Vec::new()),
        Lookup::NotIn(values) if values.is_empty() => ("1 = 1".to_string(), Vec::new()),
        Lookup::In(values) => (
            format!("{col} IN ({})", placeholders(values.len())),
            values.clone(),
        ),
        Lookup::NotIn(values) => (
            format!("{col} NOT IN ({})", placeholders(values.len())),
            values.clone(),
        ),
    })
}

impl BitAnd for Condition {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl BitOr for Condition {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

impl Not for Condition {
    type Output = Self;

    fn not(self) -> Self {
        self.negate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DatabaseBackendType;
    use crate::testing::registry;

    fn render_plain(cond: &Condition) -> (String, Vec<Value>) {
        let reg = registry();
        let ctx = ConditionContext::new(&reg, "User", "");
        cond.render(&ctx).unwrap()
    }

    // ── Leaves ──────────────────────────────────────────────────────

    #[test]
    fn test_comparison_operators() {
        assert_eq!(render_plain(&field("age").equals(3)).0, "age = ?");
        assert_eq!(render_plain(&field("age").not_equals(3)).0, "age != ?");
        assert_eq!(render_plain(&field("age").greater_than(3)).0, "age > ?");
        assert_eq!(
            render_plain(&field("age").greater_than_or_equal(3)).0,
            "age >= ?"
        );
        assert_eq!(render_plain(&field("age").less_than(3)).0, "age < ?");
        assert_eq!(render_plain(&field("age").less_than_or_equal(3)).0, "age <= ?");
        assert_eq!(render_plain(&field("age").is_null()).0, "age IS NULL");
        assert_eq!(render_plain(&field("age").is_not_null()).0, "age IS NOT NULL");
        assert_eq!(render_plain(&field("name").not_like("A%")).0, "name NOT LIKE ?");
    }

    #[test]
    fn test_like_sugar() {
        let (sql, args) = render_plain(&field("name").contains("li"));
        assert_eq!(sql, "name LIKE ?");
        assert_eq!(args, vec![Value::from("%li%")]);
        assert_eq!(render_plain(&field("name").starts_with("A")).1, vec![Value::from("A%")]);
        assert_eq!(render_plain(&field("name").ends_with("e")).1, vec![Value::from("%e")]);
    }

    #[test]
    fn test_equals_null_renders_is_null() {
        assert_eq!(render_plain(&field("age").equals(Value::Null)), ("age IS NULL".into(), vec![]));
        assert_eq!(
            render_plain(&field("age").not_equals(Value::Null)).0,
            "age IS NOT NULL"
        );
    }

    #[test]
    fn test_between() {
        let (sql, args) = render_plain(&field("age").between(18, 65));
        assert_eq!(sql, "age BETWEEN ? AND ?");
        assert_eq!(args, vec![Value::Int(18), Value::Int(65)]);
    }

    #[test]
    fn test_in_list_placeholders_match_args() {
        let (sql, args) = render_plain(&field("id").in_list([3, 1, 2]));
        assert_eq!(sql, "id IN (?, ?, ?)");
        assert_eq!(args, vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(sql.matches('?').count(), args.len());

        let (sql, args) = render_plain(&field("id").not_in(["a"]));
        assert_eq!(sql, "id NOT IN (?)");
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_empty_in_lists() {
        assert_eq!(render_plain(&field("id").in_list(Vec::<i64>::new())), ("1 = 0".into(), vec![]));
        assert_eq!(render_plain(&field("id").not_in(Vec::<i64>::new())), ("1 = 1".into(), vec![]));
    }

    // ── Column mapping ──────────────────────────────────────────────

    #[test]
    fn test_field_mapped_to_column_with_alias_and_quotes() {
        let reg = registry();
        let ctx =
            ConditionContext::new(&reg, "Post", "p").with_dialect(&DatabaseBackendType::PostgreSQL);
        let (sql, _) = field("userId").equals(1).render(&ctx).unwrap();
        assert_eq!(sql, "\"p\".\"user_id\" = ?");
    }

    #[test]
    fn test_unknown_field_passes_through() {
        assert_eq!(render_plain(&field("nickname").equals("x")).0, "nickname = ?");
    }

    #[test]
    fn test_unknown_model_is_error() {
        let reg = registry();
        let ctx = ConditionContext::new(&reg, "Ghost", "");
        assert!(field("id").equals(1).render(&ctx).is_err());
    }

    #[test]
    fn test_leaf_resolved_against_its_own_model() {
        let reg = registry();
        let ctx = ConditionContext::new(&reg, "User", "u").with_joined("Post", "p");
        let cond = field("name").equals("Ann") & FieldRef::on("Post", "userId").equals(1);
        let (sql, _) = cond.render(&ctx).unwrap();
        assert_eq!(sql, "(u.name = ?) AND (p.user_id = ?)");

    }

    #[test]
    fn test_leaf_on_unjoined_model_is_error() {
        let reg = registry();
        let ctx = ConditionContext::new(&reg, "User", "u").with_joined("Post", "p");
        let err = FieldRef::on("Comment", "postId")
            .equals(1)
            .render(&ctx)
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidQuery(ref m) if m.contains("Comment")));

        let plain = ConditionContext::new(&reg, "User", "");
        assert!(FieldRef::on("Post", "id").equals(5).render(&plain).is_err());
    }

    #[test]
    fn test_same_condition_renders_against_different_aliases() {
        let reg = registry();
        let cond = field("userId").equals(1);
        let a = cond.render(&ConditionContext::new(&reg, "Post", "p")).unwrap();
        let b = cond.render(&ConditionContext::new(&reg, "Post", "p2")).unwrap();
        assert_eq!(a.0, "p.user_id = ?");
        assert_eq!(b.0, "p2.user_id = ?");
    }

    // ── Composition ─────────────────────────────────────────────────

    #[test]
    fn test_and_or_wrap_children() {
        let cond = and([field("a").equals(1), or([field("b").equals(2), field("c").equals(3)])]);
        let (sql, args) = render_plain(&cond);
        assert_eq!(sql, "(a = ?) AND ((b = ?) OR (c = ?))");
        assert_eq!(args, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_empty_groups_absorbed() {
        assert_eq!(render_plain(&and([])), (String::new(), vec![]));
        assert_eq!(render_plain(&or([])), (String::new(), vec![]));
        let cond = and([and([]), field("a").equals(1)]);
        assert_eq!(render_plain(&cond).0, "(a = ?)");
        assert_eq!(render_plain(&not(and([]))).0, "");
        assert!(and([or([])]).is_empty());
    }

    #[test]
    fn test_double_negation_not_simplified() {
        let cond = !!field("a").equals(1);
        assert_eq!(render_plain(&cond).0, "NOT (NOT (a = ?))");
    }

    #[test]
    fn test_operators_flatten() {
        let cond = field("a").equals(1) & field("b").equals(2) & field("c").equals(3);
        match &cond {
            Condition::And(children) => assert_eq!(children.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
        let cond = field("a").equals(1) | (field("b").equals(2) | field("c").equals(3));
        match &cond {
            Condition::Or(children) => assert_eq!(children.len(), 3),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn test_raw_condition() {
        let cond = raw("age > ? AND age < ?", vec![Value::Int(1), Value::Int(9)])
            & field("name").is_not_null();
        let (sql, args) = render_plain(&cond);
        assert_eq!(sql, "(age > ? AND age < ?) AND (name IS NOT NULL)");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_mentions_other_model() {
        let cond = field("name").equals("a") & FieldRef::on("Post", "title").equals("t");
        assert!(cond.mentions_other_model("User"));
        assert!(!cond.mentions_other_model("Post"));
        assert!(!field("name").equals("a").mentions_other_model("User"));
        assert!(!FieldRef::on("User", "name").is_null().mentions_other_model("User"));
    }
}
