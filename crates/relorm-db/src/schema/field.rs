//! Field declarations.

use crate::value::Value;

/// The logical type of a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Text.
    String,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Int64,
    /// Floating-point number.
    Float,
    /// Boolean.
    Bool,
    /// Timestamp.
    DateTime,
    /// JSON document.
    Json,
    /// Fixed-point decimal, carried as text or float by the backend.
    Decimal,
    /// Binary data.
    Bytes,
}

/// A field declared on a model.
///
/// Fields are built with chained modifiers, the same way a model declares
/// them:
///
/// ```
/// use relorm_db::schema::{Field, FieldType};
///
/// let id = Field::new("id", FieldType::Int).primary_key().auto_increment();
/// let author = Field::new("authorId", FieldType::Int).map("author_id");
/// assert_eq!(id.column_name(), "id");
/// assert_eq!(author.column_name(), "author_id");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// The logical field name used in queries and records.
    pub name: String,
    /// The physical column name when it differs from `name`.
    pub column: Option<String>,
    /// The logical type.
    pub field_type: FieldType,
    /// Whether this field is (part of) the primary key.
    pub primary_key: bool,
    /// Whether the backend generates the value on insert.
    pub auto_increment: bool,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether a UNIQUE constraint applies.
    pub unique: bool,
    /// Default value for new rows.
    pub default: Option<Value>,
}

impl Field {
    /// Creates a non-null, non-key field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            column: None,
            field_type,
            primary_key: false,
            auto_increment: false,
            nullable: false,
            unique: false,
            default: None,
        }
    }

    /// Maps the field to a differently-named column.
    #[must_use]
    pub fn map(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Marks the field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the field as backend-generated.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Allows NULL values.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Adds a UNIQUE constraint.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Returns the physical column name.
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}
