//! Logging integration for relorm.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating per-query spans.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter is read from `settings.log_level` (e.g. "debug",
/// "relorm_db=trace"). In debug mode a pretty, human-readable format is used;
/// otherwise a structured JSON format is used. A subscriber that is already
/// installed is left in place.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one query execution.
///
/// # Examples
///
/// ```
/// use relorm_core::logging::query_span;
///
/// let span = query_span("User", "find_many");
/// let _guard = span.enter();
/// tracing::debug!("hydrating rows");
/// ```
pub fn query_span(model: &str, operation: &str) -> tracing::Span {
    tracing::debug_span!("query", model = model, op = operation)
}
