//! Hydration of single-level includes.

use std::collections::HashMap;

use indexmap::IndexMap;
use relorm_core::{OrmError, OrmResult};
use tracing::trace;

use super::columns::{record_key, ColumnLayout, HydrationPlan};
use super::include::IncludeProcessor;
use super::Scanner;
use crate::executor::RowCursor;
use crate::record::{Record, Related};
use crate::value::ValueKey;

/// Groups joined rows by the root record's primary key and attaches each
/// directly included relation to it.
///
/// Root records keep first-seen order. To-many relations start out empty
/// and collect distinct children in first-seen order; to-one relations
/// take the first non-null child.
#[derive(Debug)]
pub struct RelationScanner<'a> {
    plan: HydrationPlan<'a>,
    processor: IncludeProcessor,
}

#[derive(Debug)]
struct Entry {
    record: Record,
    many: HashMap<usize, IndexMap<Vec<ValueKey>, Record>>,
    one: HashMap<usize, Record>,
}

impl<'a> RelationScanner<'a> {
    /// Creates a scanner for `plan`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::HydrationError`] if the plan contains a nested
    /// relation.
    pub fn new(plan: HydrationPlan<'a>, processor: IncludeProcessor) -> OrmResult<Self> {
        if let Some(nested) = plan.slots().iter().find(|s| s.parent.is_some_and(|p| p != 0)) {
            return Err(OrmError::HydrationError(format!(
                "nested include '{}' needs the hierarchical scanner",
                nested.path
            )));
        }
        Ok(Self { plan, processor })
    }

    fn finish(&self, entry: Entry) -> OrmResult<Record> {
        let Entry {
            mut record,
            mut many,
            mut one,
        } = entry;
        for (i, slot) in self.plan.slots().iter().enumerate().skip(1) {
            let Some(name) = &slot.relation_name else {
                continue;
            };
            let related = if slot.is_to_many() {
                Related::Many(many.remove(&i).unwrap_or_default().into_values().collect())
            } else {
                Related::One(one.remove(&i).map(Box::new))
            };
            record.set_relation(
                name.clone(),
                self.processor.apply(&slot.path, slot.schema, related)?,
            );
        }
        Ok(record)
    }
}

impl Scanner for RelationScanner<'_> {
    fn scan(&self, cursor: &mut dyn RowCursor) -> OrmResult<Vec<Record>> {
        let layout = ColumnLayout::new(&self.plan, cursor.columns());
        let root_schema = self.plan.root().schema;
        let mut keyed: IndexMap<Vec<ValueKey>, usize> = IndexMap::new();
        let mut entries: Vec<Entry> = Vec::new();
        let mut rows = 0_usize;

        while let Some(row) = cursor.next_row()? {
            rows += 1;
            let mut parts = layout.split(row.into_values()).into_iter();
            let Some(root) = parts.next() else {
                continue;
            };

            // No root key means no root record at this row.
            let Some(key) = record_key(root_schema, &root) else {
                continue;
            };
            let index = *keyed.entry(key).or_insert_with(|| {
                entries.push(Entry::new(root));
                entries.len() - 1
            });
            let entry = &mut entries[index];

            for (offset, child) in parts.enumerate() {
                let slot_index = offset + 1;
                let slot = &self.plan.slots()[slot_index];
                if child.all_null() {
                    continue;
                }
                let Some(key) = record_key(slot.schema, &child) else {
                    continue;
                };
                if slot.is_to_many() {
                    entry
                        .many
                        .entry(slot_index)
                        .or_default()
                        .entry(key)
                        .or_insert(child);
                } else {
                    entry.one.entry(slot_index).or_insert(child);
                }
            }
        }

        trace!(rows, records = entries.len(), "flat scan complete");
        entries.into_iter().map(|e| self.finish(e)).collect()
    }
}

impl Entry {
    fn new(record: Record) -> Self {
        Self {
            record,
            many: HashMap::new(),
            one: HashMap::new(),
        }
    }
}
