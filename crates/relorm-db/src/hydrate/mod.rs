//! Turning result rows into records.
//!
//! - [`columns`] - alias/column resolution for joined rows
//! - [`relation_scanner`] - single-level includes
//! - [`hierarchical`] - nested includes
//! - [`include`] - post-hydration filtering, ordering, and pagination
//!
//! Scanners consume a cursor in one sequential pass. The cursor is owned by
//! the caller and dropped on every exit path.

pub mod columns;
pub mod hierarchical;
pub mod include;
pub mod relation_scanner;

use indexmap::IndexMap;
use relorm_core::OrmResult;

pub use columns::{ColumnLayout, HydrationPlan, TableSlot};
pub use hierarchical::HierarchicalScanner;
pub use include::{IncludeOption, IncludeProcessor};
pub use relation_scanner::RelationScanner;

use crate::executor::RowCursor;
use crate::query::JoinClause;
use crate::record::Record;
use crate::schema::FieldMapper;

/// Consumes a cursor and produces records in first-seen order.
pub trait Scanner {
    /// Scans every remaining row.
    ///
    /// # Errors
    ///
    /// Propagates cursor errors and include-filter evaluation errors.
    fn scan(&self, cursor: &mut dyn RowCursor) -> OrmResult<Vec<Record>>;
}

/// Maps each row of an unjoined select to a record keyed by field name.
///
/// # Errors
///
/// Returns [`relorm_core::OrmError::UnknownModel`] for an unregistered model
/// and propagates cursor errors.
pub fn scan_plain(
    mapper: &dyn FieldMapper,
    model: &str,
    cursor: &mut dyn RowCursor,
) -> OrmResult<Vec<Record>> {
    let columns = cursor.columns().clone();
    let mut records = Vec::new();
    while let Some(row) = cursor.next_row()? {
        records.push(mapper.columns_to_record(model, &columns, row.into_values())?);
    }
    Ok(records)
}

/// Hydrates the rows of a select on `model`, picking the scanner the joins
/// call for: none, flat, or hierarchical when any include is nested.
pub(crate) fn hydrate(
    mapper: &dyn FieldMapper,
    model: &str,
    alias: &str,
    joins: &[JoinClause],
    includes: &IndexMap<String, IncludeOption>,
    cursor: &mut dyn RowCursor,
) -> OrmResult<Vec<Record>> {
    if joins.is_empty() {
        return scan_plain(mapper, model, cursor);
    }
    let plan = HydrationPlan::new(mapper, model, alias, joins)?;
    let processor = IncludeProcessor::new(includes.values().cloned());
    if includes.keys().any(|path| path.contains('.')) {
        HierarchicalScanner::new(plan, processor).scan(cursor)
    } else {
        RelationScanner::new(plan, processor)?.scan(cursor)
    }
}
