//! SQL dialect capabilities.
//!
//! Assemblers never hard-code backend syntax; they ask a [`Dialect`] how to
//! quote identifiers, number placeholders, order NULLs, spell conflict
//! handling, and whether RETURNING, DEFAULT VALUES, or DISTINCT ON exist.
//! [`DatabaseBackendType`] implements it for the three SQL backends.
//!
//! Statements are assembled with `?` placeholders throughout and passed
//! through [`Dialect::finalize`] once complete, which renumbers them for
//! dialects using `$n`.

use std::fmt;
use std::str::FromStr;

use relorm_core::OrmError;

use crate::query::{NullsOrder, Order};

/// How a dialect spells positional parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`
    Question,
    /// `$1`, `$2`, ...
    Dollar,
}

/// How a dialect spells INSERT conflict handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSyntax {
    /// `INSERT OR IGNORE` / `INSERT OR REPLACE`, upserts via `ON CONFLICT`.
    InsertOr,
    /// `ON CONFLICT DO NOTHING` / `ON CONFLICT (...) DO UPDATE`.
    OnConflict,
    /// `INSERT IGNORE` / `REPLACE INTO` / `ON DUPLICATE KEY UPDATE`.
    OnDuplicateKey,
}

/// The capabilities of a target SQL dialect.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// A short name used in error messages.
    fn name(&self) -> &'static str;

    /// The identifier quote character.
    fn quote_char(&self) -> char;

    /// The placeholder style.
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Renders a boolean literal.
    fn boolean_literal(&self, value: bool) -> &'static str;

    /// Whether INSERT/UPDATE/DELETE accept a RETURNING clause.
    fn supports_returning(&self) -> bool;

    /// Whether `INSERT INTO t DEFAULT VALUES` is accepted.
    fn supports_default_values(&self) -> bool;

    /// Whether `SELECT DISTINCT ON (...)` is accepted.
    fn supports_distinct_on(&self) -> bool;

    /// Whether OFFSET is only valid after a LIMIT.
    fn requires_limit_for_offset(&self) -> bool;

    /// Whether `NULLS FIRST` / `NULLS LAST` are accepted.
    fn supports_nulls_ordering(&self) -> bool;

    /// How conflict handling is spelled.
    fn conflict_syntax(&self) -> ConflictSyntax;

    /// The LIMIT used when only an OFFSET was requested.
    fn max_limit(&self) -> u64 {
        i64::MAX.unsigned_abs()
    }

    /// Quotes an identifier. `*` is left as is.
    fn quote_identifier(&self, name: &str) -> String {
        if name == "*" {
            return name.to_string();
        }
        let q = self.quote_char();
        let escaped = name.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Renders the placeholder for a 1-based parameter index.
    fn placeholder(&self, index: usize) -> String {
        match self.placeholder_style() {
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Dollar => format!("${index}"),
        }
    }

    /// Renders one ORDER BY term.
    ///
    /// Without an explicit NULL placement, NULLs sort last where the
    /// dialect can say so. Dialects without `NULLS FIRST/LAST` emulate an
    /// explicit placement with a leading `expr IS NULL` key.
    fn order_term(&self, expr: &str, order: Order, nulls: Option<NullsOrder>) -> String {
        let dir = order.as_sql();
        if self.supports_nulls_ordering() {
            let placement = match nulls.unwrap_or(NullsOrder::Last) {
                NullsOrder::First => "NULLS FIRST",
                NullsOrder::Last => "NULLS LAST",
            };
            format!("{expr} {dir} {placement}")
        } else {
            match nulls {
                Some(NullsOrder::First) => format!("{expr} IS NULL DESC, {expr} {dir}"),
                Some(NullsOrder::Last) => format!("{expr} IS NULL ASC, {expr} {dir}"),
                None => format!("{expr} {dir}"),
            }
        }
    }

    /// Converts a statement assembled with `?` placeholders to this
    /// dialect's style.
    fn finalize(&self, sql: String) -> String {
        match self.placeholder_style() {
            PlaceholderStyle::Question => sql,
            PlaceholderStyle::Dollar => rewrite_placeholders(&sql),
        }
    }
}

/// Rewrites `?` to `$1`, `$2`, ... outside quoted strings and identifiers.
pub fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    index += 1;
                    out.push('$');
                    out.push_str(&index.to_string());
                }
                _ => out.push(c),
            },
        }
    }
    out
}

/// The SQL backends the query layer can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    /// PostgreSQL.
    PostgreSQL,
    /// SQLite.
    SQLite,
    /// MySQL.
    MySQL,
}

impl fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatabaseBackendType {
    type Err = OrmError;

    /// Parses the `engine` value of a database configuration entry.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Self::PostgreSQL),
            "sqlite" | "sqlite3" => Ok(Self::SQLite),
            "mysql" => Ok(Self::MySQL),
            other => Err(OrmError::ConfigurationError(format!(
                "Unknown database engine: {other}"
            ))),
        }
    }
}

impl Dialect for DatabaseBackendType {
    fn name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::SQLite => "sqlite",
            Self::MySQL => "mysql",
        }
    }

    fn quote_char(&self) -> char {
        match self {
            Self::PostgreSQL => '"',
            Self::SQLite | Self::MySQL => '`',
        }
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        match self {
            Self::PostgreSQL => PlaceholderStyle::Dollar,
            Self::SQLite | Self::MySQL => PlaceholderStyle::Question,
        }
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        match (self, value) {
            (Self::SQLite, true) => "1",
            (Self::SQLite, false) => "0",
            (_, true) => "TRUE",
            (_, false) => "FALSE",
        }
    }

    fn supports_returning(&self) -> bool {
        matches!(self, Self::PostgreSQL | Self::SQLite)
    }

    fn supports_default_values(&self) -> bool {
        matches!(self, Self::PostgreSQL | Self::SQLite)
    }

    fn supports_distinct_on(&self) -> bool {
        matches!(self, Self::PostgreSQL)
    }

    fn requires_limit_for_offset(&self) -> bool {
        matches!(self, Self::SQLite | Self::MySQL)
    }

    fn supports_nulls_ordering(&self) -> bool {
        matches!(self, Self::PostgreSQL | Self::SQLite)
    }

    fn conflict_syntax(&self) -> ConflictSyntax {
        match self {
            Self::PostgreSQL => ConflictSyntax::OnConflict,
            Self::SQLite => ConflictSyntax::InsertOr,
            Self::MySQL => ConflictSyntax::OnDuplicateKey,
        }
    }

    fn max_limit(&self) -> u64 {
        match self {
            Self::MySQL => u64::MAX,
            _ => i64::MAX.unsigned_abs(),
        }
    }
}
