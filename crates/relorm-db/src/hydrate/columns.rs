//! Mapping joined result columns back to table aliases and fields.
//!
//! A joined select names every column `alias_column`. [`HydrationPlan`]
//! lists the tables taking part (root first, junction tables skipped) and
//! [`ColumnLayout`] splits each row into one [`Record`] per table.

use relorm_core::{OrmError, OrmResult};

use crate::query::JoinClause;
use crate::record::Record;
use crate::schema::{FieldMapper, ModelSchema, RelationKind};
use crate::value::{Value, ValueKey};

/// One table instance of a joined select.
#[derive(Debug, Clone)]
pub struct TableSlot<'a> {
    /// The alias the table appears under.
    pub alias: String,
    /// The schema of the model stored in the table.
    pub schema: &'a ModelSchema,
    /// The relation this table realizes; `None` for the root.
    pub relation_name: Option<String>,
    /// The relation's cardinality; `None` for the root.
    pub kind: Option<RelationKind>,
    /// Index of the parent slot; `None` for the root.
    pub parent: Option<usize>,
    /// The dot path of the relation; empty for the root.
    pub path: String,
}

impl TableSlot<'_> {
    /// Returns `true` if the relation hydrates to an array.
    pub fn is_to_many(&self) -> bool {
        self.kind.is_some_and(RelationKind::is_to_many)
    }
}

/// The tables a joined select reads, in join order.
#[derive(Debug, Clone)]
pub struct HydrationPlan<'a> {
    slots: Vec<TableSlot<'a>>,
}

impl<'a> HydrationPlan<'a> {
    /// Builds the plan for `root_model` under `root_alias` and its joins.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownModel`] for an unregistered joined model
    /// and [`OrmError::HydrationError`] if a join hangs off an alias that is
    /// not part of the plan.
    pub fn new(
        mapper: &'a dyn FieldMapper,
        root_model: &str,
        root_alias: &str,
        joins: &[JoinClause],
    ) -> OrmResult<Self> {
        let mut slots = vec![TableSlot {
            alias: root_alias.to_string(),
            schema: mapper.schema(root_model)?,
            relation_name: None,
            kind: None,
            parent: None,
            path: String::new(),
        }];

        for join in joins {
            let (Some(model), Some(relation)) = (&join.model, &join.relation) else {
                continue;
            };
            let parent = slots
                .iter()
                .position(|s| s.alias == join.parent_alias)
                .ok_or_else(|| {
                    OrmError::HydrationError(format!(
                        "join '{}' attaches to unknown alias '{}'",
                        join.path, join.parent_alias
                    ))
                })?;
            slots.push(TableSlot {
                alias: join.alias.clone(),
                schema: mapper.schema(model)?,
                relation_name: Some(join.relation_name.clone()),
                kind: Some(relation.kind),
                parent: Some(parent),
                path: join.path.clone(),
            });
        }
        Ok(Self { slots })
    }

    /// The slots, root first.
    pub fn slots(&self) -> &[TableSlot<'a>] {
        &self.slots
    }

    /// The root slot.
    pub fn root(&self) -> &TableSlot<'a> {
        &self.slots[0]
    }

    /// Indices of the direct children of `slot`, in join order.
    pub fn children_of(&self, slot: usize) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.parent == Some(slot))
            .map(|(i, _)| i)
    }

    /// Slot indices ordered so that every parent precedes its children.
    pub fn topological_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.slots.len());
        let mut placed = vec![false; self.slots.len()];
        while order.len() < self.slots.len() {
            let before = order.len();
            for (i, slot) in self.slots.iter().enumerate() {
                if placed[i] {
                    continue;
                }
                if slot.parent.map_or(true, |p| placed[p]) {
                    placed[i] = true;
                    order.push(i);
                }
            }
            if order.len() == before {
                break;
            }
        }
        order
    }
}

/// Where each result column goes: a slot index and a logical field name.
#[derive(Debug, Clone)]
pub struct ColumnLayout {
    targets: Vec<(usize, String)>,
    slot_count: usize,
}

impl ColumnLayout {
    /// Resolves `columns` against the aliases of `plan`.
    ///
    /// Columns are matched as `alias_column` (longest alias first) or
    /// `alias.column`. Columns matching no alias belong to the root.
    pub fn new(plan: &HydrationPlan<'_>, columns: &[String]) -> Self {
        let targets = columns
            .iter()
            .map(|column| {
                let (slot, physical) = resolve_column(plan, column);
                let schema = plan.slots[slot].schema;
                let field = schema
                    .field_by_column(physical)
                    .map_or(physical, |f| f.name.as_str())
                    .to_string();
                (slot, field)
            })
            .collect();
        Self {
            targets,
            slot_count: plan.slots.len(),
        }
    }

    /// Splits one row into a record per slot.
    pub fn split(&self, values: Vec<Value>) -> Vec<Record> {
        let mut records = vec![Record::new(); self.slot_count];
        for ((slot, field), value) in self.targets.iter().zip(values) {
            records[*slot].set(field.clone(), value);
        }
        records
    }
}

fn resolve_column<'c>(plan: &HydrationPlan<'_>, column: &'c str) -> (usize, &'c str) {
    if let Some((alias, rest)) = column.split_once('.') {
        if let Some(slot) = plan.slots.iter().position(|s| s.alias == alias) {
            return (slot, rest);
        }
    }

    let mut best: Option<(usize, usize, bool)> = None;
    for (i, slot) in plan.slots.iter().enumerate() {
        let Some(rest) = column
            .strip_prefix(slot.alias.as_str())
            .and_then(|r| r.strip_prefix('_'))
        else {
            continue;
        };
        let known = slot.schema.field_by_column(rest).is_some();
        let len = slot.alias.len();
        let better = match best {
            None => true,
            Some((_, best_len, best_known)) => (known, len) > (best_known, best_len),
        };
        if better {
            best = Some((i, len, known));
        }
    }

    match best {
        Some((slot, len, _)) => (slot, &column[len + 1..]),
        None => (0, column),
    }
}

/// The primary-key identity of a record, or `None` when any key field is
/// missing or null.
pub fn record_key(schema: &ModelSchema, record: &Record) -> Option<Vec<ValueKey>> {
    let pk_fields = schema.primary_key_fields();
    if pk_fields.is_empty() {
        return record.get(schema.primary_key_name())?.as_key().map(|k| vec![k]);
    }
    pk_fields
        .iter()
        .map(|f| record.get(&f.name).and_then(Value::as_key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{JoinKind, JoinPlanner};
    use crate::testing::registry;

    fn plan_for<'a>(
        reg: &'a crate::schema::SchemaRegistry,
        model: &str,
        alias: &str,
        paths: &[&[&str]],
    ) -> HydrationPlan<'a> {
        let mut planner = JoinPlanner::new(reg, alias);
        for path in paths {
            planner
                .add_nested_join(alias, model, path, JoinKind::Left)
                .unwrap();
        }
        HydrationPlan::new(reg, model, alias, &planner.into_joins()).unwrap()
    }

    #[test]
    fn test_plan_skips_junction_tables() {
        let reg = registry();
        let plan = plan_for(&reg, "Post", "p", &[&["tags"]]);
        assert_eq!(plan.slots().len(), 2);
        assert_eq!(plan.slots()[1].alias, "t");
        assert_eq!(plan.slots()[1].parent, Some(0));
        assert!(plan.slots()[1].is_to_many());
    }

    #[test]
    fn test_plan_nested_parents() {
        let reg = registry();
        let plan = plan_for(&reg, "User", "u", &[&["posts", "comments"]]);
        let paths: Vec<_> = plan.slots().iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, ["", "posts", "posts.comments"]);
        assert_eq!(plan.slots()[2].parent, Some(1));
        assert_eq!(plan.children_of(0).collect::<Vec<_>>(), [1]);
        assert_eq!(plan.topological_order(), [0, 1, 2]);
    }

    #[test]
    fn test_layout_longest_alias_wins() {
        let reg = registry();
        // u, u2 (users via posts.author)
        let plan = plan_for(&reg, "User", "u", &[&["posts", "author"]]);
        let aliases: Vec<_> = plan.slots().iter().map(|s| s.alias.as_str()).collect();
        assert_eq!(aliases, ["u", "p", "u2"]);

        let columns: Vec<String> = ["u_id", "u2_name", "p_user_id", "p.title", "extra"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let layout = ColumnLayout::new(&plan, &columns);
        let parts = layout.split(vec![
            Value::from(1),
            Value::from("Bo"),
            Value::from(1),
            Value::from("T"),
            Value::from(9),
        ]);

        assert_eq!(parts[0].get("id"), Some(&Value::from(1)));
        assert_eq!(parts[0].get("extra"), Some(&Value::from(9)));
        assert_eq!(parts[1].get("userId"), Some(&Value::from(1)));
        assert_eq!(parts[1].get("title"), Some(&Value::from("T")));
        assert_eq!(parts[2].get("name"), Some(&Value::from("Bo")));
    }

    #[test]
    fn test_record_key() {
        let reg = registry();
        let schema = reg.schema("User").unwrap();
        assert!(record_key(schema, &Record::new().with("id", 3)).is_some());
        assert!(record_key(schema, &Record::new().with("id", Value::Null)).is_none());
        assert!(record_key(schema, &Record::new().with("name", "x")).is_none());
    }

    #[test]
    fn test_plan_unknown_parent_alias() {
        let reg = registry();
        let mut planner = JoinPlanner::new(&reg, "u");
        planner
            .add_relation_join("User", "u", "posts", JoinKind::Left)
            .unwrap();
        let err = HydrationPlan::new(&reg, "User", "x", &planner.into_joins()).unwrap_err();
        assert!(matches!(err, OrmError::HydrationError(_)));
    }
}
