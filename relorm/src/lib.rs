//! # relorm
//!
//! Schema-driven query building and nested relation hydration over SQL
//! backends.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access. Depend on `relorm` to get everything, or on the individual
//! crates for finer-grained control.
//!
//! # Examples
//!
//! ```
//! use relorm::prelude::*;
//!
//! let schema = SchemaRegistry::new()
//!     .with(
//!         ModelSchema::new("User")
//!             .add_field(Field::new("id", FieldType::Int).primary_key())
//!             .add_field(Field::new("name", FieldType::String))
//!             .add_relation("posts", Relation::one_to_many("Post", "userId")),
//!     )
//!     .with(
//!         ModelSchema::new("Post")
//!             .add_field(Field::new("id", FieldType::Int).primary_key())
//!             .add_field(Field::new("userId", FieldType::Int).map("user_id")),
//!     );
//! let orm = Orm::new(schema, DatabaseBackendType::PostgreSQL);
//!
//! let (sql, _) = orm.model("User").include("posts").build_sql().unwrap();
//! assert_eq!(
//!     sql,
//!     concat!(
//!         r#"SELECT "u"."id" AS "u_id", "u"."name" AS "u_name", "#,
//!         r#""p"."id" AS "p_id", "p"."user_id" AS "p_user_id" "#,
//!         r#"FROM "users" AS "u" LEFT JOIN "posts" AS "p" ON "p"."user_id" = "u"."id""#,
//!     )
//! );
//! ```

/// Error types, settings, and logging.
pub use relorm_core as core;

/// Schema, dialects, query builders, and hydration.
pub use relorm_db as db;

/// Database executors.
pub use relorm_db_backends as db_backends;

// Third-party re-exports for user convenience.
pub use async_trait;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use tracing_subscriber;

/// The types most programs need.
pub mod prelude {
    pub use relorm_core::{OrmError, OrmResult, Settings};
    pub use relorm_db::{
        and, field, not, or, Condition, DatabaseBackendType, DbExecutor, Field, FieldType,
        IncludeOption, ModelQuery, ModelSchema, Order, OrderBy, Orm, Record, Related, Relation,
        SchemaRegistry, Value,
    };
    #[cfg(feature = "sqlite")]
    pub use relorm_db_backends::SqliteExecutor;
}
