//! Hydration of nested includes such as `posts.comments`.
//!
//! Every distinct (table alias, primary key) pair seen in the rows becomes
//! one node in an arena. Within a row, each node is linked under the node
//! of its parent alias from the same row, so membership follows row
//! co-occurrence. A second pass walks the arena from the roots and
//! materializes nested records. Nodes are addressed by index, which keeps
//! self-referential relations free of reference cycles.

use std::collections::HashMap;

use indexmap::IndexSet;
use relorm_core::OrmResult;
use tracing::trace;

use super::columns::{record_key, ColumnLayout, HydrationPlan};
use super::include::IncludeProcessor;
use super::Scanner;
use crate::executor::RowCursor;
use crate::record::{Record, Related};
use crate::value::ValueKey;

#[derive(Debug)]
struct Node {
    slot: usize,
    record: Record,
    children: HashMap<usize, IndexSet<usize>>,
}

/// Scans joined rows of arbitrary include depth into nested records.
#[derive(Debug)]
pub struct HierarchicalScanner<'a> {
    plan: HydrationPlan<'a>,
    processor: IncludeProcessor,
}

#[derive(Debug, Default)]
struct Arena {
    nodes: Vec<Node>,
    index: HashMap<(usize, Vec<ValueKey>), usize>,
    roots: IndexSet<usize>,
}

impl Arena {
    fn node_for(&mut self, slot: usize, key: Vec<ValueKey>, record: Record) -> usize {
        let nodes = &mut self.nodes;
        *self.index.entry((slot, key)).or_insert_with(|| {
            nodes.push(Node {
                slot,
                record,
                children: HashMap::new(),
            });
            nodes.len() - 1
        })
    }
}

impl<'a> HierarchicalScanner<'a> {
    /// Creates a scanner for `plan`.
    pub const fn new(plan: HydrationPlan<'a>, processor: IncludeProcessor) -> Self {
        Self { plan, processor }
    }

    fn materialize(&self, arena: &Arena, id: usize) -> OrmResult<Record> {
        let node = &arena.nodes[id];
        let mut record = node.record.clone();
        for child_slot in self.plan.children_of(node.slot) {
            let slot = &self.plan.slots()[child_slot];
            let Some(name) = &slot.relation_name else {
                continue;
            };
            let mut children = Vec::new();
            if let Some(ids) = node.children.get(&child_slot) {
                for &child in ids {
                    children.push(self.materialize(arena, child)?);
                }
            }
            let related = if slot.is_to_many() {
                Related::Many(children)
            } else {
                Related::One(children.into_iter().next().map(Box::new))
            };
            record.set_relation(
                name.clone(),
                self.processor.apply(&slot.path, slot.schema, related)?,
            );
        }
        Ok(record)
    }
}

impl Scanner for HierarchicalScanner<'_> {
    fn scan(&self, cursor: &mut dyn RowCursor) -> OrmResult<Vec<Record>> {
        let layout = ColumnLayout::new(&self.plan, cursor.columns());
        let order = self.plan.topological_order();
        let slots = self.plan.slots();
        let mut arena = Arena::default();
        let mut rows = 0_usize;

        while let Some(row) = cursor.next_row()? {
            rows += 1;
            let mut parts = layout.split(row.into_values());
            let mut row_nodes: Vec<Option<usize>> = vec![None; slots.len()];

            for &slot_index in &order {
                let slot = &slots[slot_index];
                let record = std::mem::take(&mut parts[slot_index]);
                // A row without a key holds no record for this alias, and
                // none for the aliases nested under it.
                let Some(key) = record_key(slot.schema, &record) else {
                    continue;
                };

                let Some(parent) = slot.parent else {
                    let id = arena.node_for(slot_index, key, record);
                    arena.roots.insert(id);
                    row_nodes[slot_index] = Some(id);
                    continue;
                };
                let Some(parent_id) = row_nodes[parent] else {
                    continue;
                };
                let id = arena.node_for(slot_index, key, record);
                arena.nodes[parent_id]
                    .children
                    .entry(slot_index)
                    .or_default()
                    .insert(id);
                row_nodes[slot_index] = Some(id);
            }
        }

        trace!(
            rows,
            nodes = arena.nodes.len(),
            roots = arena.roots.len(),
            "hierarchical scan complete"
        );
        arena
            .roots
            .iter()
            .map(|&id| self.materialize(&arena, id))
            .collect()
    }
}
