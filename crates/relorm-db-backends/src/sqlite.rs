//! SQLite executor using `rusqlite`.
//!
//! The connection lives behind an async mutex and every statement runs on
//! `tokio::task::spawn_blocking`. Query results are read to the end on the
//! blocking thread and handed back as a [`RowSet`], since a `rusqlite`
//! statement cannot leave the thread that owns its connection.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use relorm_core::settings::DatabaseSettings;
use relorm_core::{OrmError, OrmResult};
use relorm_db::dialect::DatabaseBackendType;
use relorm_db::executor::{DbExecutor, ExecResult, RowCursor, RowSet};
use relorm_db::value::Value;
use rusqlite::types::ValueRef;
use rusqlite::ErrorCode;
use tokio::sync::Mutex;
use tracing::trace;

/// A SQLite database.
pub struct SqliteExecutor {
    /// The path to the database file (or ":memory:").
    path: PathBuf,
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl std::fmt::Debug for SqliteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteExecutor")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteExecutor {
    /// Opens a database at `path`; `:memory:` opens an in-memory database.
    ///
    /// Foreign keys are enforced, and file databases use WAL journaling.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::OperationalError`] if the database cannot be
    /// opened or configured.
    pub fn open(path: impl Into<PathBuf>) -> OrmResult<Self> {
        Self::open_with(path.into(), "")
    }

    /// Opens the database a configuration entry names. Each entry of
    /// `options` is applied as a `PRAGMA`, e.g. `cache_size = "-2000"`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::ConfigurationError`] if the engine is not SQLite
    /// or an option is not a plain pragma name and value.
    pub fn from_settings(settings: &DatabaseSettings) -> OrmResult<Self> {
        let backend: DatabaseBackendType = settings.engine.parse()?;
        if backend != DatabaseBackendType::SQLite {
            return Err(OrmError::ConfigurationError(format!(
                "Engine '{}' is not SQLite",
                settings.engine
            )));
        }
        Self::open_with(PathBuf::from(&settings.name), &pragma_script(&settings.options)?)
    }

    fn open_with(path: PathBuf, extra_pragmas: &str) -> OrmResult<Self> {
        let in_memory = path.to_str() == Some(":memory:");
        let conn = if in_memory {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| OrmError::OperationalError(format!("SQLite open failed: {e}")))?;

        let pragmas = if in_memory {
            "PRAGMA foreign_keys=ON;"
        } else {
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;"
        };
        conn.execute_batch(&format!("{pragmas}{extra_pragmas}"))
            .map_err(|e| OrmError::OperationalError(format!("Failed to set pragmas: {e}")))?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database.
    pub fn memory() -> OrmResult<Self> {
        Self::open(":memory:")
    }

    /// The database file path.
    pub const fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Runs several `;`-separated statements without arguments, such as a
    /// schema script.
    pub async fn execute_batch(&self, sql: &str) -> OrmResult<()> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute_batch(&sql).map_err(map_error)
        })
        .await
        .map_err(join_error)?
    }

    fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> OrmResult<()> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
                Value::Date(d) => stmt.raw_bind_parameter(idx, d.to_string()),
                Value::DateTime(dt) => stmt.raw_bind_parameter(idx, dt.to_string()),
                Value::DateTimeTz(dt) => stmt.raw_bind_parameter(idx, dt.to_rfc3339()),
                Value::Time(t) => stmt.raw_bind_parameter(idx, t.to_string()),
                Value::Uuid(u) => stmt.raw_bind_parameter(idx, u.to_string()),
                Value::Json(j) => stmt.raw_bind_parameter(idx, j.to_string()),
                Value::List(_) => stmt.raw_bind_parameter(idx, param.to_json().to_string()),
            }
            .map_err(|e| OrmError::DatabaseError(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    /// Text that is not valid UTF-8 comes back as bytes, unaltered.
    fn convert_value(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Int(v),
            ValueRef::Real(v) => Value::Float(v),
            ValueRef::Text(b) => std::str::from_utf8(b)
                .map_or_else(|_| Value::Bytes(b.to_vec()), |s| Value::String(s.to_string())),
            ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
        }
    }
}

/// Maps a `rusqlite` error onto the execution error variants.
fn map_error(err: rusqlite::Error) -> OrmError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => OrmError::IntegrityError(err.to_string()),
        Some(
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::ReadOnly
            | ErrorCode::DiskFull,
        ) => OrmError::OperationalError(err.to_string()),
        _ => OrmError::DatabaseError(err.to_string()),
    }
}

/// Renders configured options as `PRAGMA name=value;` statements, sorted
/// by name.
fn pragma_script(options: &HashMap<String, String>) -> OrmResult<String> {
    let plain = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    };
    let mut entries: Vec<_> = options.iter().collect();
    entries.sort();
    let mut script = String::new();
    for (name, value) in entries {
        if !plain(name) || !plain(value) {
            return Err(OrmError::ConfigurationError(format!(
                "Invalid SQLite option: {name}={value}"
            )));
        }
        script.push_str(&format!("PRAGMA {name}={value};"));
    }
    Ok(script)
}

fn join_error(err: tokio::task::JoinError) -> OrmError {
    OrmError::DatabaseError(format!("Task join error: {err}"))
}

fn is_insert(sql: &str) -> bool {
    let head = sql.trim_start();
    ["INSERT", "REPLACE"].iter().any(|kw| {
        head.get(..kw.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(kw))
    })
}

#[async_trait::async_trait]
impl DbExecutor for SqliteExecutor {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> OrmResult<ExecResult> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let params = params.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&sql).map_err(map_error)?;
            Self::bind_params(&mut stmt, &params)?;
            // Stepped as a query so statements with RETURNING run too.
            let mut rows = stmt.raw_query();
            while rows.next().map_err(map_error)?.is_some() {}
            drop(rows);
            drop(stmt);

            let result = ExecResult {
                last_insert_id: is_insert(&sql).then(|| conn.last_insert_rowid()),
                rows_affected: conn.changes(),
            };
            trace!(rows_affected = result.rows_affected, "sqlite execute");
            Ok(result)
        })
        .await
        .map_err(join_error)?
    }

    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Box<dyn RowCursor>> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let params = params.to_vec();

        let rows = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&sql).map_err(map_error)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            Self::bind_params(&mut stmt, &params)?;

            let mut raw_rows = stmt.raw_query();
            let mut rows = Vec::new();
            while let Some(row) = raw_rows.next().map_err(map_error)? {
                let values = (0..columns.len())
                    .map(|i| row.get_ref(i).map(Self::convert_value).map_err(map_error))
                    .collect::<OrmResult<Vec<_>>>()?;
                rows.push(values);
            }
            trace!(rows = rows.len(), "sqlite query");
            Ok::<_, OrmError>(RowSet::new(columns, rows))
        })
        .await
        .map_err(join_error)??;

        Ok(Box::new(rows))
    }
}
