//! # relorm-core
//!
//! Core types for relorm: the error taxonomy, settings, settings loading, and
//! logging setup. This crate has no database dependencies and provides the
//! foundation for the query and backend crates.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Settings and global configuration
//! - [`settings_loader`] - TOML/JSON/environment loading
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{OrmError, OrmResult, ResultExt};
pub use settings::{Settings, SETTINGS};
