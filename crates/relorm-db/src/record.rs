//! Hydrated records.
//!
//! A [`Record`] is the dynamic destination of every read: an ordered map of
//! logical field names to [`Value`]s plus an ordered map of relation names to
//! nested [`Related`] records. Insert and update builders accept records as
//! their data as well. [`Record::into_struct`] is the typed path; it goes
//! through serde, whose derive builds the field lookup for a type once at
//! compile time.

use indexmap::IndexMap;
use relorm_core::{OrmError, OrmResult};
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;

use crate::value::Value;

/// The hydrated value of one relation on a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// A many-to-one or one-to-one relation; `None` when nothing matched.
    One(Option<Box<Record>>),
    /// A one-to-many or many-to-many relation, in first-seen order.
    Many(Vec<Record>),
}

impl Related {
    /// Converts the relation to plain JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::One(Some(record)) => record.to_json(),
            Self::One(None) => serde_json::Value::Null,
            Self::Many(records) => {
                serde_json::Value::Array(records.iter().map(Record::to_json).collect())
            }
        }
    }
}

/// An ordered, dynamically-typed record keyed by logical field name.
///
/// # Examples
///
/// ```
/// use relorm_db::record::Record;
/// use relorm_db::value::Value;
///
/// let user: Record = [("name", Value::from("Alice")), ("age", Value::from(30))]
///     .into_iter()
///     .collect();
/// assert_eq!(user.get("name"), Some(&Value::from("Alice")));
/// assert_eq!(user.field_names().collect::<Vec<_>>(), ["name", "age"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<String, Value>,
    relations: IndexMap<String, Related>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Returns the value of a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Removes a field, keeping the order of the others.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.shift_remove(field)
    }

    /// Returns `true` if the field is present (it may still be `Null`).
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Iterates over fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over field names in insertion order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of fields (relations excluded).
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no fields and no relations.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.relations.is_empty()
    }

    /// Returns `true` if every field is `Null` (or there are none).
    pub fn all_null(&self) -> bool {
        self.fields.values().all(Value::is_null)
    }

    /// Keeps only the fields for which `keep` returns `true`.
    pub fn retain_fields(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.fields.retain(|k, _| keep(k));
    }

    /// Returns a hydrated relation.
    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    /// Returns a mutable hydrated relation.
    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Related> {
        self.relations.get_mut(name)
    }

    /// Sets a hydrated relation.
    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) {
        self.relations.insert(name.into(), related);
    }

    /// Iterates over hydrated relations in insertion order.
    pub fn relations(&self) -> impl Iterator<Item = (&str, &Related)> {
        self.relations.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the records of a to-many relation.
    pub fn many(&self, name: &str) -> Option<&[Record]> {
        match self.relations.get(name)? {
            Related::Many(records) => Some(records),
            Related::One(_) => None,
        }
    }

    /// Returns the record of a to-one relation, if one matched.
    pub fn one(&self, name: &str) -> Option<&Record> {
        match self.relations.get(name)? {
            Related::One(record) => record.as_deref(),
            Related::Many(_) => None,
        }
    }

    /// Converts the record, relations included, to a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.fields.len() + self.relations.len());
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        for (name, related) in &self.relations {
            map.insert(name.clone(), related.to_json());
        }
        serde_json::Value::Object(map)
    }

    /// Deserializes the record into a typed struct.
    ///
    /// Relations appear as nested objects or arrays under their names.
    pub fn into_struct<T: DeserializeOwned>(&self) -> OrmResult<T> {
        serde_json::from_value(self.to_json()).map_err(|e| {
            OrmError::HydrationError(format!(
                "cannot populate {} from record: {e}",
                std::any::type_name::<T>()
            ))
        })
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            relations: IndexMap::new(),
        }
    }
}

impl serde::Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + self.relations.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, &value.to_json())?;
        }
        for (name, related) in &self.relations {
            map.serialize_entry(name, &related.to_json())?;
        }
        map.end()
    }
}
