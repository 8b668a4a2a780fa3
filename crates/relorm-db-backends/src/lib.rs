//! # relorm-db-backends
//!
//! Executors that run relorm statements against real databases. Each
//! backend implements [`DbExecutor`](relorm_db::DbExecutor) and sits behind
//! a cargo feature.
//!
//! Supported backends:
//! - `SQLite` (feature `sqlite`, on by default)

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteExecutor;
