//! Backend-agnostic values for query arguments and hydrated fields.
//!
//! [`Value`] is what condition trees bind as arguments, what executors
//! return per column, and what hydrated [`Record`](crate::record::Record)s
//! hold. Hydration also needs two things SQL gives for free: a hashable
//! identity for primary keys ([`ValueKey`]) and a loose ordering across the
//! representations different backends return for the same logical type
//! ([`Value::compare`]).

use std::cmp::Ordering;
use std::fmt;

/// A backend-agnostic representation of a database value.
///
/// # Examples
///
/// ```
/// use relorm_db::value::Value;
///
/// assert_eq!(Value::from(42_i64), Value::Int(42));
/// assert_eq!(Value::from("hello"), Value::String("hello".to_string()));
/// assert_eq!(Value::from(None::<i64>), Value::Null);
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// SQL NULL.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// Raw binary data.
    Bytes(Vec<u8>),
    /// A date without time.
    Date(chrono::NaiveDate),
    /// A date and time without timezone.
    DateTime(chrono::NaiveDateTime),
    /// A date and time with UTC timezone.
    DateTimeTz(chrono::DateTime<chrono::Utc>),
    /// A time without date.
    Time(chrono::NaiveTime),
    /// A UUID value.
    Uuid(uuid::Uuid),
    /// A JSON document.
    Json(serde_json::Value),
    /// A list of values.
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::DateTimeTz(dt) => write!(f, "{dt}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Json(j) => write!(f, "{j}"),
            Self::List(vals) => {
                let parts: Vec<String> = vals.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident $(via $conv:path)?),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant($($conv)?(v))
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i16 => Int via i64::from,
    i32 => Int via i64::from,
    u32 => Int via i64::from,
    i64 => Int,
    f32 => Float via f64::from,
    f64 => Float,
    String => String,
    Vec<u8> => Bytes,
    chrono::NaiveDate => Date,
    chrono::NaiveDateTime => DateTime,
    chrono::DateTime<chrono::Utc> => DateTimeTz,
    chrono::NaiveTime => Time,
    uuid::Uuid => Uuid,
    serde_json::Value => Json,
    Vec<Value> => List,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A hashable identity derived from a [`Value`].
///
/// Used to deduplicate hydrated records by primary key. Two values that an
/// executor may return for the same key (e.g. `Bool(true)` and `Int(1)` from
/// SQLite) are not unified; keys come from one column of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKey {
    /// Boolean key.
    Bool(bool),
    /// Integer key.
    Int(i64),
    /// Float key, by bit pattern.
    Float(u64),
    /// Text key.
    Text(String),
    /// Binary key.
    Bytes(Vec<u8>),
    /// UUID key.
    Uuid(uuid::Uuid),
    /// Any other value, by its display form.
    Other(String),
}

impl Value {
    /// Returns `true` if this value is `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to extract a boolean value.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to extract an integer value.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to extract a float value. Integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Attempts to extract a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the hashable identity of this value, or `None` for `Null`.
    pub fn as_key(&self) -> Option<ValueKey> {
        Some(match self {
            Self::Null => return None,
            Self::Bool(b) => ValueKey::Bool(*b),
            Self::Int(i) => ValueKey::Int(*i),
            Self::Float(f) => ValueKey::Float(f.to_bits()),
            Self::String(s) => ValueKey::Text(s.clone()),
            Self::Bytes(b) => ValueKey::Bytes(b.clone()),
            Self::Uuid(u) => ValueKey::Uuid(*u),
            other => ValueKey::Other(other.to_string()),
        })
    }

    /// Compares two values across the representations backends use.
    ///
    /// Integers and floats compare numerically, booleans compare with the
    /// integers SQLite stores them as, and temporal or UUID values compare
    /// with strings by their canonical text form. `Null` compares equal only
    /// to `Null`. Returns `None` for values with no sensible ordering.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_float()?.partial_cmp(&other.as_float()?)
            }
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Int(b)) => Some(i64::from(*a).cmp(b)),
            (Self::Int(a), Self::Bool(b)) => Some(a.cmp(&i64::from(*b))),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::DateTimeTz(a), Self::DateTimeTz(b)) => Some(a.cmp(b)),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            (Self::String(s), v) if v.has_canonical_text() => {
                Some(s.as_str().cmp(v.to_string().as_str()))
            }
            (v, Self::String(s)) if v.has_canonical_text() => {
                Some(v.to_string().as_str().cmp(s.as_str()))
            }
            (Self::Json(a), Self::Json(b)) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }

    const fn has_canonical_text(&self) -> bool {
        matches!(
            self,
            Self::Date(_) | Self::DateTime(_) | Self::DateTimeTz(_) | Self::Time(_) | Self::Uuid(_)
        )
    }

    /// Returns `true` if both values are non-null and compare equal.
    pub fn loose_eq(&self, other: &Self) -> bool {
        !self.is_null() && self.compare(other) == Some(Ordering::Equal)
    }

    /// Converts this value to plain JSON (no type tags).
    ///
    /// Temporal values use chrono's serde form so they can be deserialized
    /// back into chrono types by typed hydration.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.clone()),
            Self::Bytes(b) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
            Self::Date(d) => serde_json::to_value(d).unwrap_or(Json::Null),
            Self::DateTime(dt) => serde_json::to_value(dt).unwrap_or(Json::Null),
            Self::DateTimeTz(dt) => serde_json::to_value(dt).unwrap_or(Json::Null),
            Self::Time(t) => serde_json::to_value(t).unwrap_or(Json::Null),
            Self::Uuid(u) => Json::String(u.to_string()),
            Self::Json(j) => j.clone(),
            Self::List(vals) => Json::Array(vals.iter().map(Self::to_json).collect()),
        }
    }
}
