//! The entry point tying a schema and a dialect together.

use std::sync::Arc;

use relorm_core::settings::{QuerySettings, DEFAULT_DB_ALIAS};
use relorm_core::{OrmResult, Settings, SETTINGS};

use crate::dialect::{DatabaseBackendType, Dialect};
use crate::query::{JoinKind, ModelQuery, RawQuery};
use crate::schema::FieldMapper;
use crate::value::Value;

/// Query-layer options, usually read from [`QuerySettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Emit built statements at `debug` level.
    pub log_sql: bool,
    /// Join kind used for includes.
    pub default_join: JoinKind,
    /// Maximum number of segments in an include path.
    pub max_include_depth: usize,
}

impl QueryOptions {
    /// Reads the options from settings.
    ///
    /// # Errors
    ///
    /// Returns [`relorm_core::OrmError::ConfigurationError`] for an unknown
    /// join kind.
    pub fn from_settings(settings: &QuerySettings) -> OrmResult<Self> {
        Ok(Self {
            log_sql: settings.log_sql,
            default_join: settings.default_join.parse()?,
            max_include_depth: settings.max_include_depth,
        })
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            log_sql: true,
            default_join: JoinKind::Left,
            max_include_depth: 8,
        }
    }
}

/// A schema mapper and a dialect, shared by every query built from them.
///
/// Cloning is cheap; both halves are reference counted.
///
/// # Examples
///
/// ```
/// use relorm_db::dialect::DatabaseBackendType;
/// use relorm_db::orm::Orm;
/// use relorm_db::query::field;
/// use relorm_db::schema::{Field, FieldType, ModelSchema, SchemaRegistry};
///
/// let registry = SchemaRegistry::new().with(
///     ModelSchema::new("User")
///         .add_field(Field::new("id", FieldType::Int).primary_key())
///         .add_field(Field::new("name", FieldType::String)),
/// );
/// let orm = Orm::new(registry, DatabaseBackendType::PostgreSQL);
///
/// let (sql, args) = orm
///     .model("User")
///     .where_condition(field("name").equals("Ann"))
///     .build_sql()
///     .unwrap();
/// assert_eq!(sql, r#"SELECT "u".* FROM "users" AS "u" WHERE "u"."name" = $1"#);
/// assert_eq!(args.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Orm {
    mapper: Arc<dyn FieldMapper>,
    dialect: Arc<dyn Dialect>,
    options: QueryOptions,
}

impl Orm {
    /// Creates an ORM with default options.
    pub fn new(mapper: impl FieldMapper + 'static, dialect: impl Dialect + 'static) -> Self {
        Self::from_shared(Arc::new(mapper), Arc::new(dialect))
    }

    /// Creates an ORM from already shared halves.
    pub fn from_shared(mapper: Arc<dyn FieldMapper>, dialect: Arc<dyn Dialect>) -> Self {
        Self {
            mapper,
            dialect,
            options: QueryOptions::default(),
        }
    }

    /// Creates an ORM for the default database in `settings`: the dialect
    /// follows its engine and the options follow the query settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a missing default database, an
    /// unknown engine, or invalid query settings.
    pub fn from_settings(
        mapper: impl FieldMapper + 'static,
        settings: &Settings,
    ) -> OrmResult<Self> {
        let backend: DatabaseBackendType = settings.database(DEFAULT_DB_ALIAS)?.engine.parse()?;
        Ok(Self::new(mapper, backend).with_options(QueryOptions::from_settings(&settings.query)?))
    }

    /// Creates an ORM from the global [`SETTINGS`].
    ///
    /// # Errors
    ///
    /// As [`Orm::from_settings`].
    pub fn configured(mapper: impl FieldMapper + 'static) -> OrmResult<Self> {
        Self::from_settings(mapper, SETTINGS.get())
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// The field mapper.
    pub fn mapper(&self) -> &dyn FieldMapper {
        self.mapper.as_ref()
    }

    /// The dialect.
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// The options.
    pub const fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Starts a query on `model`.
    pub fn model(&self, model: impl Into<String>) -> ModelQuery {
        ModelQuery::new(self.clone(), model.into())
    }

    /// Wraps verbatim SQL.
    pub fn raw(&self, sql: impl Into<String>, args: Vec<Value>) -> RawQuery {
        RawQuery::new(self.clone(), sql.into(), args)
    }
}
