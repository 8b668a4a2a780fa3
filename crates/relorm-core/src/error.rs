//! Core error types for relorm.
//!
//! This module provides the [`OrmError`] enum that covers every failure the
//! query layer can report: name resolution, statement construction, backend
//! execution, result hydration, and configuration. Execution entry points wrap
//! errors with [`OrmError::context`] so a failure names the operation and model
//! that produced it.

use thiserror::Error;

/// The primary error type for relorm.
///
/// Variants are grouped by the phase that raises them. Resolution and
/// construction errors are raised before any SQL reaches a backend; execution
/// errors carry the backend's own message unchanged.
#[derive(Error, Debug)]
pub enum OrmError {
    // ── Resolution errors ────────────────────────────────────────────

    /// The model name is not registered with the schema registry.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// The field is not declared on the model.
    #[error("Unknown field '{field}' on model '{model}'")]
    UnknownField {
        /// The model that was searched.
        model: String,
        /// The field that could not be found.
        field: String,
    },

    /// The relation is not declared on the model.
    #[error("Unknown relation '{relation}' on model '{model}'")]
    UnknownRelation {
        /// The model that was searched.
        model: String,
        /// The relation that could not be found.
        relation: String,
    },

    /// The relation exists but cannot be used the way it was requested.
    #[error("Unsupported relation: {0}")]
    UnsupportedRelation(String),

    // ── Construction errors ──────────────────────────────────────────

    /// An INSERT was built without any rows.
    #[error("No data to insert")]
    NoInsertData,

    /// An UPDATE was built without any assignments.
    #[error("No data to update")]
    NoUpdateData,

    /// A returning call was made without naming any fields to return.
    #[error("No returning fields specified")]
    NoReturningFields,

    /// The backend cannot return rows from a data-modifying statement.
    #[error("RETURNING is not supported by {0}")]
    ReturningUnsupported(String),

    /// A DELETE was built without any WHERE condition.
    #[error("Refusing to delete from '{0}' without a WHERE condition")]
    UnboundedDelete(String),

    /// An UPDATE was built without any WHERE condition.
    #[error("Refusing to update '{0}' without a WHERE condition")]
    UnboundedUpdate(String),

    /// An aggregate query has nothing to select.
    #[error("Aggregate query requires at least one field or aggregation")]
    NoAggregations,

    /// The query description is inconsistent (e.g. ragged multi-row insert).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // ── Execution errors ─────────────────────────────────────────────

    /// A query expected exactly one result but found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// A query expected exactly one result but found multiple.
    #[error("Multiple objects returned when one expected: {0}")]
    MultipleObjectsReturned(String),

    /// A generic database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A database integrity constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// An operational database error (connection failure, etc.).
    #[error("Operational error: {0}")]
    OperationalError(String),

    // ── Hydration ────────────────────────────────────────────────────

    /// Rows could not be turned into the requested destination shape.
    #[error("Hydration error: {0}")]
    HydrationError(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── Serialization ────────────────────────────────────────────────

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // ── Context ──────────────────────────────────────────────────────

    /// Another error, annotated with the operation that raised it.
    #[error("{operation}: {source}")]
    Context {
        /// A short description such as `find_many User`.
        operation: String,
        /// The underlying error.
        #[source]
        source: Box<OrmError>,
    },
}

impl OrmError {
    /// Wraps this error with the name of the operation that produced it.
    #[must_use]
    pub fn context(self, operation: impl Into<String>) -> Self {
        Self::Context {
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping any context wrappers.
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns `true` for errors raised while resolving model, field, or
    /// relation names.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self.root(),
            Self::UnknownModel(_)
                | Self::UnknownField { .. }
                | Self::UnknownRelation { .. }
                | Self::UnsupportedRelation(_)
        )
    }

    /// Returns `true` for errors raised while assembling a statement, before
    /// anything was sent to the backend.
    pub fn is_construction(&self) -> bool {
        matches!(
            self.root(),
            Self::NoInsertData
                | Self::NoUpdateData
                | Self::NoReturningFields
                | Self::ReturningUnsupported(_)
                | Self::UnboundedDelete(_)
                | Self::UnboundedUpdate(_)
                | Self::NoAggregations
                | Self::InvalidQuery(_)
        )
    }
}

/// Attaches operation context to the error half of a result.
pub trait ResultExt<T> {
    /// Wraps an error with [`OrmError::context`].
    fn context(self, operation: impl Into<String>) -> OrmResult<T>;
}

impl<T> ResultExt<T> for OrmResult<T> {
    fn context(self, operation: impl Into<String>) -> OrmResult<T> {
        self.map_err(|e| e.context(operation))
    }
}

/// A convenience type alias for `Result<T, OrmError>`.
pub type OrmResult<T> = Result<T, OrmError>;
