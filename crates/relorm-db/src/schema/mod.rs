//! The logical schema the query layer reads.
//!
//! A [`ModelSchema`] declares a model's table, fields, and named relations.
//! Schemas are registered with a [`SchemaRegistry`], which implements the
//! [`FieldMapper`] trait the planner, assemblers, and hydrators resolve names
//! through.

pub mod field;
pub mod naming;
pub mod registry;
pub mod relation;

use indexmap::IndexMap;
use relorm_core::{OrmError, OrmResult};

pub use field::{Field, FieldType};
pub use registry::{FieldMapper, SchemaRegistry};
pub use relation::{ReferentialAction, Relation, RelationKind};

/// The declaration of one model.
///
/// # Examples
///
/// ```
/// use relorm_db::schema::{Field, FieldType, ModelSchema, Relation};
///
/// let user = ModelSchema::new("User")
///     .add_field(Field::new("id", FieldType::Int).primary_key().auto_increment())
///     .add_field(Field::new("name", FieldType::String))
///     .add_relation("posts", Relation::one_to_many("Post", "userId"));
///
/// assert_eq!(user.table_name, "users");
/// assert_eq!(user.primary_key_name(), "id");
/// assert!(user.relation("posts").is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSchema {
    /// The model name.
    pub name: String,
    /// The physical table name.
    pub table_name: String,
    /// Fields in declaration order.
    pub fields: Vec<Field>,
    /// Relations keyed by relation name, in declaration order.
    pub relations: IndexMap<String, Relation>,
    /// Field names forming a composite primary key, if any.
    pub composite_key: Vec<String>,
}

impl ModelSchema {
    /// Creates an empty schema with the conventional table name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table_name: naming::model_name_to_table_name(&name),
            name,
            fields: Vec::new(),
            relations: IndexMap::new(),
            composite_key: Vec::new(),
        }
    }

    /// Overrides the table name.
    #[must_use]
    pub fn with_table_name(mut self, table: impl Into<String>) -> Self {
        self.table_name = table.into();
        self
    }

    /// Appends a field.
    #[must_use]
    pub fn add_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares a named relation.
    #[must_use]
    pub fn add_relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    /// Declares a composite primary key.
    #[must_use]
    pub fn with_composite_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.composite_key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Looks up a field by logical name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field by physical column name.
    pub fn field_by_column(&self, column: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.column_name() == column)
    }

    /// Resolves a logical field name to its column.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownField`] if the field is not declared.
    pub fn column_name(&self, field: &str) -> OrmResult<&str> {
        self.field(field)
            .map(Field::column_name)
            .ok_or_else(|| OrmError::UnknownField {
                model: self.name.clone(),
                field: field.to_string(),
            })
    }

    /// Iterates over the physical column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(Field::column_name)
    }

    /// Returns the primary-key fields: the composite key if declared,
    /// otherwise every field flagged as primary key.
    pub fn primary_key_fields(&self) -> Vec<&Field> {
        if self.composite_key.is_empty() {
            self.fields.iter().filter(|f| f.primary_key).collect()
        } else {
            self.composite_key
                .iter()
                .filter_map(|name| self.field(name))
                .collect()
        }
    }

    /// Returns the name of the (first) primary-key field, `id` if none is
    /// declared.
    pub fn primary_key_name(&self) -> &str {
        self.primary_key_fields()
            .first()
            .map_or("id", |f| f.name.as_str())
    }

    /// Returns `true` if the relation is declared.
    pub fn has_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Looks up a relation by name.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownRelation`] if the relation is not declared.
    pub fn relation(&self, name: &str) -> OrmResult<&Relation> {
        self.relations
            .get(name)
            .ok_or_else(|| OrmError::UnknownRelation {
                model: self.name.clone(),
                relation: name.to_string(),
            })
    }

    /// Checks that the schema is usable: it has a name, a table, fields, and
    /// exactly one kind of primary key.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::ConfigurationError`] describing the first problem.
    pub fn validate(&self) -> OrmResult<()> {
        let invalid =
            |msg: &str| Err(OrmError::ConfigurationError(format!("{}: {msg}", self.name)));

        if self.name.is_empty() {
            return Err(OrmError::ConfigurationError(
                "schema name cannot be empty".to_string(),
            ));
        }
        if self.table_name.is_empty() {
            return invalid("table name cannot be empty");
        }
        if self.fields.is_empty() {
            return invalid("schema must have at least one field");
        }

        let flagged = self.fields.iter().filter(|f| f.primary_key).count();
        if flagged > 1 {
            return invalid("schema can only have one single-field primary key");
        }
        if flagged == 1 && !self.composite_key.is_empty() {
            return invalid("schema cannot have both single and composite primary keys");
        }
        if let Some(missing) = self
            .composite_key
            .iter()
            .find(|name| self.field(name).is_none())
        {
            return invalid(&format!("composite key field {missing} not found"));
        }
        if flagged == 0 && self.composite_key.is_empty() {
            return invalid("schema must have a primary key");
        }
        Ok(())
    }
}
