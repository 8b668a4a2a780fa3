//! Settings for relorm.
//!
//! This module provides the [`Settings`] struct, which holds logging, database,
//! and query-layer configuration, and [`LazySettings`], a globally-accessible,
//! lazily-initialized settings instance.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{OrmError, OrmResult};

/// The alias of the database used when none is named.
pub const DEFAULT_DB_ALIAS: &str = "default";

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The database engine (`sqlite`, `postgresql`, `mysql`).
    pub engine: String,
    /// The database name (or file path for `SQLite`, `:memory:` for in-memory).
    pub name: String,
    /// Additional engine-specific options.
    pub options: HashMap<String, String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: "sqlite".to_string(),
            name: ":memory:".to_string(),
            options: HashMap::new(),
        }
    }
}

/// Query-layer behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySettings {
    /// Emit every built statement at `debug` level.
    pub log_sql: bool,
    /// Join kind used for includes: `left` or `inner`.
    pub default_join: String,
    /// Maximum number of segments in an include path.
    pub max_include_depth: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            log_sql: true,
            default_join: "left".to_string(),
            max_include_depth: 8,
        }
    }
}

/// The complete set of relorm settings.
///
/// # Examples
///
/// ```
/// use relorm_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.query.max_include_depth, 8);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Whether debug mode is enabled (pretty logs instead of JSON).
    pub debug: bool,
    /// The log filter directive (e.g. "info", "relorm_db=debug").
    pub log_level: String,
    /// Database configurations, keyed by alias (e.g. "default").
    pub databases: HashMap<String, DatabaseSettings>,
    /// Query-layer settings.
    pub query: QuerySettings,
}

impl Default for Settings {
    fn default() -> Self {
        let mut databases = HashMap::new();
        databases.insert(DEFAULT_DB_ALIAS.to_string(), DatabaseSettings::default());

        Self {
            debug: true,
            log_level: "info".to_string(),
            databases,
            query: QuerySettings::default(),
        }
    }
}

impl Settings {
    /// The database configured under `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::ConfigurationError`] if no such database exists.
    pub fn database(&self, alias: &str) -> OrmResult<&DatabaseSettings> {
        self.databases.get(alias).ok_or_else(|| {
            OrmError::ConfigurationError(format!("No database configured as '{alias}'"))
        })
    }
}

/// A lazily-initialized, globally-accessible settings container.
///
/// Call [`configure`](LazySettings::configure) once at startup. Code that
/// reads settings falls back to [`Settings::default`] until then.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global settings.
    ///
    /// Returns the rejected settings if they were already configured.
    pub fn configure(&self, settings: Settings) -> Result<(), Settings> {
        self.inner.set(settings)
    }

    /// Returns the configured settings, or the defaults if none were set.
    pub fn get(&self) -> &Settings {
        self.inner.get_or_init(Settings::default)
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();
