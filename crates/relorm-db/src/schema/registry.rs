//! Name resolution between the logical schema and physical tables.
//!
//! [`FieldMapper`] is the boundary every other component resolves names
//! through. Unknown models are errors; unknown fields are echoed back
//! unchanged so raw or computed names (`COUNT(*)`, aggregate aliases) pass
//! through.

use std::collections::HashMap;
use std::fmt;

use relorm_core::{OrmError, OrmResult};

use super::ModelSchema;
use crate::record::Record;
use crate::value::Value;

/// Resolves model and field names to tables and columns, in both directions.
pub trait FieldMapper: Send + Sync + fmt::Debug {
    /// Returns the schema of a model.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownModel`] if the model is not registered.
    fn schema(&self, model: &str) -> OrmResult<&ModelSchema>;

    /// Resolves a model name to its table name.
    fn model_to_table(&self, model: &str) -> OrmResult<String> {
        Ok(self.schema(model)?.table_name.clone())
    }

    /// Resolves a field name to its column name; unknown fields are echoed.
    fn field_to_column(&self, model: &str, field: &str) -> OrmResult<String> {
        let schema = self.schema(model)?;
        Ok(schema
            .field(field)
            .map_or(field, |f| f.column_name())
            .to_string())
    }

    /// Resolves a column name to its field name; unknown columns are echoed.
    fn column_to_field(&self, model: &str, column: &str) -> OrmResult<String> {
        let schema = self.schema(model)?;
        Ok(schema
            .field_by_column(column)
            .map_or(column, |f| f.name.as_str())
            .to_string())
    }

    /// Resolves several field names at once.
    fn fields_to_columns(&self, model: &str, fields: &[String]) -> OrmResult<Vec<String>> {
        fields
            .iter()
            .map(|f| self.field_to_column(model, f))
            .collect()
    }

    /// Converts a record keyed by field name to column/value pairs, keeping
    /// the record's field order.
    fn record_to_columns(&self, model: &str, record: &Record) -> OrmResult<Vec<(String, Value)>> {
        record
            .fields()
            .map(|(field, value)| Ok((self.field_to_column(model, field)?, value.clone())))
            .collect()
    }

    /// Builds a record keyed by field name from a row of column values.
    fn columns_to_record(
        &self,
        model: &str,
        columns: &[String],
        values: Vec<Value>,
    ) -> OrmResult<Record> {
        columns
            .iter()
            .zip(values)
            .map(|(column, value)| Ok((self.column_to_field(model, column)?, value)))
            .collect()
    }
}

/// The default [`FieldMapper`]: a map of registered model schemas.
///
/// # Examples
///
/// ```
/// use relorm_db::schema::{Field, FieldMapper, FieldType, ModelSchema, SchemaRegistry};
///
/// let registry = SchemaRegistry::new().with(
///     ModelSchema::new("User")
///         .add_field(Field::new("id", FieldType::Int).primary_key())
///         .add_field(Field::new("firstName", FieldType::String).map("first_name")),
/// );
///
/// assert_eq!(registry.model_to_table("User").unwrap(), "users");
/// assert_eq!(registry.field_to_column("User", "firstName").unwrap(), "first_name");
/// assert_eq!(registry.field_to_column("User", "COUNT(*)").unwrap(), "COUNT(*)");
/// ```
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    models: HashMap<String, ModelSchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema, replacing any previous schema with the same name.
    pub fn register(&mut self, schema: ModelSchema) {
        self.models.insert(schema.name.clone(), schema);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(mut self, schema: ModelSchema) -> Self {
        self.register(schema);
        self
    }

    /// Returns `true` if the model is registered.
    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// Iterates over the registered model names (in no particular order).
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Validates every registered schema and checks that each relation
    /// targets a registered model.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(&self) -> OrmResult<()> {
        for schema in self.models.values() {
            schema.validate()?;
            for (name, relation) in &schema.relations {
                if !self.contains(&relation.model) {
                    return Err(OrmError::ConfigurationError(format!(
                        "relation '{name}' on '{}' targets unknown model '{}'",
                        schema.name, relation.model
                    )));
                }
            }
        }
        Ok(())
    }
}

impl FieldMapper for SchemaRegistry {
    fn schema(&self, model: &str) -> OrmResult<&ModelSchema> {
        self.models
            .get(model)
            .ok_or_else(|| OrmError::UnknownModel(model.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, FieldType, Relation};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(
                ModelSchema::new("User")
                    .add_field(Field::new("id", FieldType::Int).primary_key())
                    .add_field(Field::new("firstName", FieldType::String).map("first_name"))
                    .add_relation("posts", Relation::one_to_many("Post", "userId")),
            )
            .with(
                ModelSchema::new("Post")
                    .add_field(Field::new("id", FieldType::Int).primary_key())
                    .add_field(Field::new("userId", FieldType::Int).map("user_id")),
            )
    }

    #[test]
    fn test_unknown_model_is_error() {
        let err = registry().model_to_table("Ghost").unwrap_err();
        assert!(matches!(err, OrmError::UnknownModel(ref m) if m == "Ghost"));
        assert!(registry().field_to_column("Ghost", "id").is_err());
    }

    #[test]
    fn test_field_column_round_trip() {
        let r = registry();
        assert_eq!(r.field_to_column("User", "firstName").unwrap(), "first_name");
        assert_eq!(r.column_to_field("User", "first_name").unwrap(), "firstName");
    }

    #[test]
    fn test_unknown_names_echo() {
        let r = registry();
        assert_eq!(r.field_to_column("User", "nickname").unwrap(), "nickname");
        assert_eq!(r.column_to_field("User", "total").unwrap(), "total");
    }

    #[test]
    fn test_fields_to_columns() {
        let cols = registry()
            .fields_to_columns("User", &["id".to_string(), "firstName".to_string()])
            .unwrap();
        assert_eq!(cols, ["id", "first_name"]);
    }

    #[test]
    fn test_record_mapping_keeps_order() {
        let r = registry();
        let record = Record::new().with("firstName", "Ann").with("id", 3);
        let cols = r.record_to_columns("User", &record).unwrap();
        assert_eq!(cols[0], ("first_name".to_string(), Value::from("Ann")));
        assert_eq!(cols[1].0, "id");

        let back = r
            .columns_to_record(
                "User",
                &["id".to_string(), "first_name".to_string()],
                vec![Value::Int(3), Value::from("Ann")],
            )
            .unwrap();
        assert_eq!(back.field_names().collect::<Vec<_>>(), ["id", "firstName"]);
    }

    #[test]
    fn test_validate_relations() {
        assert!(registry().validate().is_ok());
        let dangling = SchemaRegistry::new().with(
            ModelSchema::new("User")
                .add_field(Field::new("id", FieldType::Int).primary_key())
                .add_relation("posts", Relation::one_to_many("Post", "userId")),
        );
        assert!(dangling
            .validate()
            .unwrap_err()
            .to_string()
            .contains("unknown model 'Post'"));
    }
}
