//! Join planning for relation includes.
//!
//! The [`JoinPlanner`] walks relation declarations from a root model,
//! allocates a unique alias per joined table, derives each join predicate
//! from the relation's cardinality, and records every join under its full
//! dot-path (`posts.comments`). Requesting a path that is already joined
//! returns the existing alias, so two includes sharing a prefix share its
//! joins.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use relorm_core::{OrmError, OrmResult};

use crate::dialect::Dialect;
use crate::schema::{naming, FieldMapper, ModelSchema, Relation, RelationKind};

/// The SQL join kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    #[default]
    Left,
    /// `RIGHT JOIN`
    Right,
    /// `FULL OUTER JOIN`
    Full,
}

impl JoinKind {
    /// The SQL keyword.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL OUTER JOIN",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for JoinKind {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "full" => Ok(Self::Full),
            other => Err(OrmError::ConfigurationError(format!(
                "Unknown join kind: {other}"
            ))),
        }
    }
}

/// `left_alias.left_column = right_alias.right_column`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPredicate {
    /// Alias on the left of `=`.
    pub left_alias: String,
    /// Column on the left of `=`.
    pub left_column: String,
    /// Alias on the right of `=`.
    pub right_alias: String,
    /// Column on the right of `=`.
    pub right_column: String,
}

impl JoinPredicate {
    fn new(
        left_alias: &str,
        left_column: &str,
        right_alias: &str,
        right_column: &str,
    ) -> Self {
        Self {
            left_alias: left_alias.to_string(),
            left_column: left_column.to_string(),
            right_alias: right_alias.to_string(),
            right_column: right_column.to_string(),
        }
    }

    /// Renders the predicate with the dialect's quoting.
    pub fn to_sql(&self, dialect: &dyn Dialect) -> String {
        let q = |s: &str| dialect.quote_identifier(s);
        format!(
            "{}.{} = {}.{}",
            q(&self.left_alias),
            q(&self.left_column),
            q(&self.right_alias),
            q(&self.right_column)
        )
    }
}

/// One joined table.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    /// The join kind.
    pub kind: JoinKind,
    /// The physical table.
    pub table: String,
    /// The allocated alias.
    pub alias: String,
    /// The ON predicate.
    pub predicate: JoinPredicate,
    /// The joined model; `None` for a many-to-many junction table.
    pub model: Option<String>,
    /// The relation name on the parent model.
    pub relation_name: String,
    /// The relation realized by this join; `None` for a junction table.
    pub relation: Option<Relation>,
    /// The alias of the table this one hangs off in the result tree.
    pub parent_alias: String,
    /// The full dot-path from the root model.
    pub path: String,
}

impl JoinClause {
    /// Returns `true` for the junction half of a many-to-many join.
    pub fn is_junction(&self) -> bool {
        self.model.is_none()
    }

    /// Renders `KIND table AS alias ON predicate`.
    pub fn to_sql(&self, dialect: &dyn Dialect) -> String {
        format!(
            "{} {} AS {} ON {}",
            self.kind,
            dialect.quote_identifier(&self.table),
            dialect.quote_identifier(&self.alias),
            self.predicate.to_sql(dialect)
        )
    }
}

/// Plans the joins a query needs for its includes.
#[derive(Debug)]
pub struct JoinPlanner<'a> {
    mapper: &'a dyn FieldMapper,
    root_alias: String,
    joins: Vec<JoinClause>,
    alias_counts: HashMap<String, usize>,
    used_aliases: HashSet<String>,
    joined_paths: HashMap<String, String>,
}

impl<'a> JoinPlanner<'a> {
    /// Creates a planner whose root table uses `root_alias`, which is
    /// reserved so no joined table receives it.
    pub fn new(mapper: &'a dyn FieldMapper, root_alias: impl Into<String>) -> Self {
        let root_alias = root_alias.into();
        let mut planner = Self {
            mapper,
            root_alias: String::new(),
            joins: Vec::new(),
            alias_counts: HashMap::new(),
            used_aliases: HashSet::new(),
            joined_paths: HashMap::new(),
        };
        planner.reserve(&root_alias);
        planner.root_alias = root_alias;
        planner
    }

    /// Reserves an alias so it is never allocated.
    pub fn reserve(&mut self, alias: &str) {
        self.alias_counts.entry(alias.to_string()).or_insert(1);
        self.used_aliases.insert(alias.to_string());
    }

    /// The planned joins, in the order they must appear in SQL.
    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    /// Consumes the planner, returning its joins.
    pub fn into_joins(self) -> Vec<JoinClause> {
        self.joins
    }

    /// The alias allocated for a relation path, if it was joined.
    pub fn alias_for_path(&self, path: &str) -> Option<&str> {
        self.joined_paths.get(path).map(String::as_str)
    }

    /// Renders all joins, space-separated.
    pub fn build_sql(&self, dialect: &dyn Dialect) -> String {
        self.joins
            .iter()
            .map(|j| j.to_sql(dialect))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Allocates an alias from the initials of the table's words, adding a
    /// counter on collision (`users` -> `u`, then `u2`).
    pub fn generate_alias(&mut self, table: &str) -> String {
        let base: String = table
            .split('_')
            .filter_map(|part| part.chars().next())
            .collect();
        let base = if base.is_empty() { "t".to_string() } else { base };

        let mut alias = base.clone();
        loop {
            let count = self.alias_counts.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                alias = format!("{base}{count}");
            }
            if self.used_aliases.insert(alias.clone()) {
                return alias;
            }
        }
    }

    fn path_of(&self, from_alias: &str, relation_name: &str) -> String {
        if from_alias == self.root_alias {
            return relation_name.to_string();
        }
        self.joins
            .iter()
            .find(|j| j.alias == from_alias)
            .map_or_else(
                || relation_name.to_string(),
                |parent| format!("{}.{relation_name}", parent.path),
            )
    }

    /// Joins one relation of `from_model` (aliased `from_alias`) and returns
    /// the alias of the related table. A path joined before is reused.
    ///
    /// # Errors
    ///
    /// Returns a resolution error if the model, relation, or a key column
    /// cannot be resolved.
    pub fn add_relation_join(
        &mut self,
        from_model: &str,
        from_alias: &str,
        relation_name: &str,
        kind: JoinKind,
    ) -> OrmResult<String> {
        let path = self.path_of(from_alias, relation_name);
        if let Some(alias) = self.joined_paths.get(&path) {
            return Ok(alias.clone());
        }

        let from_schema = self.mapper.schema(from_model)?;
        let relation = from_schema.relation(relation_name)?.clone();
        if relation.kind == RelationKind::ManyToMany {
            return self.add_many_to_many_join(from_model, from_alias, relation_name, kind);
        }

        let to_schema = self.mapper.schema(&relation.model)?;
        let table = to_schema.table_name.clone();
        let alias = self.generate_alias(&table);
        let predicate = join_predicate(&relation, from_alias, &alias, from_schema, to_schema)?;

        self.joins.push(JoinClause {
            kind,
            table,
            alias: alias.clone(),
            predicate,
            model: Some(relation.model.clone()),
            relation_name: relation_name.to_string(),
            relation: Some(relation),
            parent_alias: from_alias.to_string(),
            path: path.clone(),
        });
        self.joined_paths.insert(path, alias.clone());
        Ok(alias)
    }

    /// Joins every relation along `path`, starting at `from_model`, and
    /// returns the alias of the last one.
    ///
    /// # Errors
    ///
    /// Returns a resolution error for any unresolvable segment, and
    /// [`OrmError::UnsupportedRelation`] if a many-to-many relation is
    /// followed by further segments.
    pub fn add_nested_join(
        &mut self,
        from_alias: &str,
        from_model: &str,
        path: &[&str],
        kind: JoinKind,
    ) -> OrmResult<String> {
        let mut alias = from_alias.to_string();
        let mut model = from_model.to_string();
        for (i, segment) in path.iter().enumerate() {
            let relation = self.mapper.schema(&model)?.relation(segment)?.clone();
            if relation.kind == RelationKind::ManyToMany && i + 1 < path.len() {
                return Err(OrmError::UnsupportedRelation(format!(
                    "many-to-many relation '{segment}' on '{model}' cannot be traversed \
                     by a nested include"
                )));
            }
            alias = self.add_relation_join(&model, &alias, segment, kind)?;
            model = relation.model;
        }
        Ok(alias)
    }

    /// Joins a many-to-many relation through its junction table and
    /// returns the alias of the related table.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnsupportedRelation`] if the relation is not
    /// many-to-many or relates a model to itself, and resolution errors for
    /// unknown names.
    pub fn add_many_to_many_join(
        &mut self,
        from_model: &str,
        from_alias: &str,
        relation_name: &str,
        kind: JoinKind,
    ) -> OrmResult<String> {
        let path = self.path_of(from_alias, relation_name);
        if let Some(alias) = self.joined_paths.get(&path) {
            return Ok(alias.clone());
        }

        let from_schema = self.mapper.schema(from_model)?;
        let relation = from_schema.relation(relation_name)?.clone();
        if relation.kind != RelationKind::ManyToMany {
            return Err(OrmError::UnsupportedRelation(format!(
                "relation '{relation_name}' on '{from_model}' is not many-to-many"
            )));
        }
        if relation.model == from_model {
            return Err(OrmError::UnsupportedRelation(format!(
                "self-referential many-to-many relation '{relation_name}' on '{from_model}'"
            )));
        }
        let to_schema = self.mapper.schema(&relation.model)?;

        let junction = naming::junction_table_name(from_model, &relation.model);
        let junction_alias = self.generate_alias(&junction);
        let from_column = from_schema
            .column_name(from_schema.primary_key_name())?
            .to_string();
        let junction_from = format!("{}_id", from_schema.table_name.to_lowercase());

        self.joins.push(JoinClause {
            kind,
            table: junction.clone(),
            alias: junction_alias.clone(),
            predicate: JoinPredicate::new(
                from_alias,
                &from_column,
                &junction_alias,
                &junction_from,
            ),
            model: None,
            relation_name: relation_name.to_string(),
            relation: None,
            parent_alias: from_alias.to_string(),
            path: format!("{path}#{junction}"),
        });

        let table = to_schema.table_name.clone();
        let alias = self.generate_alias(&table);
        let referenced = relation
            .references
            .as_deref()
            .unwrap_or_else(|| to_schema.primary_key_name());
        let to_column = to_schema.column_name(referenced)?.to_string();
        let junction_to = format!("{}_id", table.to_lowercase());

        self.joins.push(JoinClause {
            kind,
            table,
            alias: alias.clone(),
            predicate: JoinPredicate::new(&junction_alias, &junction_to, &alias, &to_column),
            model: Some(relation.model.clone()),
            relation_name: relation_name.to_string(),
            relation: Some(relation),
            parent_alias: from_alias.to_string(),
            path: path.clone(),
        });
        self.joined_paths.insert(path, alias.clone());
        Ok(alias)
    }
}

/// Derives the ON predicate for a direct (non-junction) relation.
fn join_predicate(
    relation: &Relation,
    from_alias: &str,
    to_alias: &str,
    from: &ModelSchema,
    to: &ModelSchema,
) -> OrmResult<JoinPredicate> {
    // Foreign key on the declaring side: from.fk = to.ref
    let forward = || -> OrmResult<JoinPredicate> {
        let referenced = relation
            .references
            .as_deref()
            .unwrap_or_else(|| to.primary_key_name());
        Ok(JoinPredicate::new(
            from_alias,
            from.column_name(&relation.foreign_key)?,
            to_alias,
            to.column_name(referenced)?,
        ))
    };
    // Foreign key on the related side: to.fk = from.ref
    let backward = || -> OrmResult<JoinPredicate> {
        let referenced = relation
            .references
            .as_deref()
            .unwrap_or_else(|| from.primary_key_name());
        Ok(JoinPredicate::new(
            to_alias,
            to.column_name(&relation.foreign_key)?,
            from_alias,
            from.column_name(referenced)?,
        ))
    };

    match relation.kind {
        RelationKind::ManyToOne => forward(),
        RelationKind::OneToMany => backward(),
        RelationKind::OneToOne => {
            if from.field(&relation.foreign_key).is_some() {
                forward()
            } else {
                backward()
            }
        }
        RelationKind::ManyToMany => Err(OrmError::UnsupportedRelation(format!(
            "many-to-many relation to '{}' requires a junction join",
            relation.model
        ))),
    }
}
