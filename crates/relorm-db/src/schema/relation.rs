//! Relation declarations between models.

/// The cardinality of a relation, seen from the declaring model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    /// Each side has at most one counterpart.
    OneToOne,
    /// The declaring model has many related rows (the foreign key lives on
    /// the related model).
    OneToMany,
    /// The declaring model holds the foreign key.
    ManyToOne,
    /// Both sides have many counterparts, through a junction table.
    ManyToMany,
}

impl RelationKind {
    /// Returns `true` if hydration produces an array for this relation.
    pub const fn is_to_many(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }
}

/// What happens to referencing rows when the referenced row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReferentialAction {
    /// Propagate the change.
    Cascade,
    /// Reject the change while references exist.
    Restrict,
    /// Set the foreign key to NULL.
    SetNull,
    /// Set the foreign key to its default.
    SetDefault,
    /// Take no action.
    NoAction,
}

/// A named, typed edge from one model to another.
///
/// `foreign_key` is a logical field name: on the declaring model for
/// many-to-one, on the related model for one-to-many, and on whichever side
/// declares it for one-to-one. `references` defaults to the primary key of the
/// referenced side.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    /// The cardinality.
    pub kind: RelationKind,
    /// The related model name.
    pub model: String,
    /// The foreign-key field name.
    pub foreign_key: String,
    /// The referenced field name, if not the primary key.
    pub references: Option<String>,
    /// ON DELETE action.
    pub on_delete: Option<ReferentialAction>,
    /// ON UPDATE action.
    pub on_update: Option<ReferentialAction>,
}

impl Relation {
    fn new(kind: RelationKind, model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            foreign_key: foreign_key.into(),
            references: None,
            on_delete: None,
            on_update: None,
        }
    }

    /// A relation whose foreign key lives on the declaring model.
    pub fn many_to_one(model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::ManyToOne, model, foreign_key)
    }

    /// A relation whose foreign key lives on the related model.
    pub fn one_to_many(model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::OneToMany, model, foreign_key)
    }

    /// A one-to-one relation; the foreign key may live on either side.
    pub fn one_to_one(model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::OneToOne, model, foreign_key)
    }

    /// A many-to-many relation through the conventional junction table.
    pub fn many_to_many(model: impl Into<String>) -> Self {
        Self::new(RelationKind::ManyToMany, model, String::new())
    }

    /// Sets the referenced field.
    #[must_use]
    pub fn references(mut self, field: impl Into<String>) -> Self {
        self.references = Some(field.into());
        self
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub const fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }
}
