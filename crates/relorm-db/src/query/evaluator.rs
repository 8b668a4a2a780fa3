//! In-memory evaluation of conditions against hydrated records.
//!
//! The include processor filters related records after hydration with the
//! same [`Condition`] trees queries render to SQL. Evaluation follows SQL
//! semantics: a comparison involving NULL is false, `IS NULL` matches a
//! missing field, and LIKE patterns use `%` and `_` wildcards.

use std::cmp::Ordering;

use regex::Regex;
use relorm_core::{OrmError, OrmResult};

use super::condition::{Condition, Lookup};
use crate::record::Record;
use crate::value::Value;

/// Evaluates a condition against a record.
///
/// # Errors
///
/// Returns [`OrmError::HydrationError`] for raw SQL conditions, which cannot
/// be evaluated in memory, and for LIKE patterns that fail to compile.
pub fn evaluate(condition: &Condition, record: &Record) -> OrmResult<bool> {
    match condition {
        Condition::And(children) => {
            for child in children {
                if !evaluate(child, record)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Or(children) => {
            if children.iter().all(Condition::is_empty) {
                return Ok(true);
            }
            for child in children.iter().filter(|c| !c.is_empty()) {
                if evaluate(child, record)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Not(child) => {
            if child.is_empty() {
                return Ok(true);
            }
            Ok(!evaluate(child, record)?)
        }
        Condition::Raw { sql, .. } => Err(OrmError::HydrationError(format!(
            "raw condition '{sql}' cannot be evaluated against hydrated records"
        ))),
        Condition::Compare(cmp) => {
            let value = record.get(&cmp.field).unwrap_or(&Value::Null);
            evaluate_lookup(value, &cmp.lookup)
        }
    }
}

/// Orders two non-null values, falling back to their text form.
/// `None` when either side is NULL or the types have no common ordering,
/// so the lookup fails as it would in SQL.
fn order(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    a.compare(b)
}

fn holds(a: &Value, b: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    order(a, b).is_some_and(accept)
}

fn evaluate_lookup(value: &Value, lookup: &Lookup) -> OrmResult<bool> {
    Ok(match lookup {
        Lookup::Eq(Value::Null) | Lookup::IsNull => value.is_null(),
        Lookup::Ne(Value::Null) | Lookup::IsNotNull => !value.is_null(),
        Lookup::Eq(v) => holds(value, v, Ordering::is_eq),
        Lookup::Ne(v) => holds(value, v, Ordering::is_ne),
        Lookup::Gt(v) => holds(value, v, Ordering::is_gt),
        Lookup::Gte(v) => holds(value, v, Ordering::is_ge),
        Lookup::Lt(v) => holds(value, v, Ordering::is_lt),
        Lookup::Lte(v) => holds(value, v, Ordering::is_le),
        Lookup::Between(lo, hi) => {
            holds(value, lo, Ordering::is_ge) && holds(value, hi, Ordering::is_le)
        }
        Lookup::In(values) => values.iter().any(|v| holds(value, v, Ordering::is_eq)),
        Lookup::NotIn(values) => {
            if values.is_empty() {
                true
            } else if value.is_null() {
                false
            } else {
                !values.iter().any(|v| holds(value, v, Ordering::is_eq))
            }
        }
        Lookup::Like(pattern) => !value.is_null() && like(pattern, value)?,
        Lookup::NotLike(pattern) => !value.is_null() && !like(pattern, value)?,
    })
}

/// Matches a value's text against a SQL LIKE pattern.
fn like(pattern: &str, value: &Value) -> OrmResult<bool> {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let re = like_regex(pattern)?;
    Ok(re.is_match(&text))
}

/// Translates a LIKE pattern to an anchored regex; other characters match
/// literally.
pub fn like_regex(pattern: &str) -> OrmResult<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    let mut literal = String::new();
    let flush = |literal: &mut String, re: &mut String| {
        if !literal.is_empty() {
            re.push_str(&regex::escape(literal));
            literal.clear();
        }
    };
    for c in pattern.chars() {
        match c {
            '%' => {
                flush(&mut literal, &mut re);
                re.push_str(".*");
            }
            '_' => {
                flush(&mut literal, &mut re);
                re.push('.');
            }
            other => literal.push(other),
        }
    }
    flush(&mut literal, &mut re);
    re.push('$');
    Regex::new(&re)
        .map_err(|e| OrmError::HydrationError(format!("invalid LIKE pattern '{pattern}': {e}")))
}
