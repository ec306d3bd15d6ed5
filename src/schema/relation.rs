use serde::Deserialize;

/// The three relationship kinds between tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum RelationKind {
    #[serde(rename = "hm", alias = "has_many")]
    HasMany,
    #[serde(rename = "bt", alias = "belongs_to")]
    BelongsTo,
    #[serde(rename = "mm", alias = "many_to_many")]
    ManyToMany,
}

impl RelationKind {
    /// Suffix of the nested property holding related rows.
    pub const fn suffix(self) -> &'static str {
        match self {
            RelationKind::HasMany => "List",
            RelationKind::BelongsTo => "Read",
            RelationKind::ManyToMany => "MMList",
        }
    }

    /// Prefix of the indexed per-relation arguments (`hfields1`, `bwhere2`).
    pub const fn arg_prefix(self) -> &'static str {
        match self {
            RelationKind::HasMany => "h",
            RelationKind::BelongsTo => "b",
            RelationKind::ManyToMany => "m",
        }
    }

    /// Name of the request argument listing relations of this kind.
    pub const fn list_arg(self) -> &'static str {
        match self {
            RelationKind::HasMany => "hm",
            RelationKind::BelongsTo => "bt",
            RelationKind::ManyToMany => "mm",
        }
    }

    pub const fn inverse(self) -> Self {
        match self {
            RelationKind::HasMany => RelationKind::BelongsTo,
            RelationKind::BelongsTo => RelationKind::HasMany,
            RelationKind::ManyToMany => RelationKind::ManyToMany,
        }
    }
}

/// Junction table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Junction {
    pub table: String,
    /// Junction column referencing the owning table
    pub column: String,
    /// Junction column referencing the related table
    pub related_column: String,
}

/// A relation seen from its owning table.
///
/// `column` lives on the owner and `related_column` on the related table:
///
/// - has-many: owner primary key, child foreign key
/// - belongs-to: owner foreign key, referenced parent column
/// - many-to-many: owner key and related key, linked through [`Junction`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Relation {
    pub kind: RelationKind,
    /// Physical name of the related table
    pub related: String,
    pub column: String,
    pub related_column: String,
    #[serde(default)]
    pub junction: Option<Junction>,
}

impl Relation {
    pub fn has_many(
        child: impl Into<String>,
        pk: impl Into<String>,
        child_fk: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::HasMany,
            related: child.into(),
            column: pk.into(),
            related_column: child_fk.into(),
            junction: None,
        }
    }

    pub fn belongs_to(
        parent: impl Into<String>,
        fk: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::BelongsTo,
            related: parent.into(),
            column: fk.into(),
            related_column: parent_column.into(),
            junction: None,
        }
    }

    pub fn many_to_many(
        related: impl Into<String>,
        column: impl Into<String>,
        related_column: impl Into<String>,
        junction: Junction,
    ) -> Self {
        Self {
            kind: RelationKind::ManyToMany,
            related: related.into(),
            column: column.into(),
            related_column: related_column.into(),
            junction: Some(junction),
        }
    }

    /// The same relation seen from the related table.
    pub fn mirror(&self, owner: &str) -> Relation {
        Relation {
            kind: self.kind.inverse(),
            related: owner.to_string(),
            column: self.related_column.clone(),
            related_column: self.column.clone(),
            junction: self.junction.as_ref().map(|j| Junction {
                table: j.table.clone(),
                column: j.related_column.clone(),
                related_column: j.column.clone(),
            }),
        }
    }

    /// At most one related row per owner row.
    #[inline]
    pub fn is_to_one(&self) -> bool {
        self.kind == RelationKind::BelongsTo
    }
}

/// Identifies a relation by kind and related table name or alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct RelationRef {
    pub kind: RelationKind,
    pub table: String,
}

impl RelationRef {
    pub fn new(kind: RelationKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
        }
    }
}

/// Aggregate applied by a rollup column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollupFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl RollupFunc {
    pub const fn sql_name(self) -> &'static str {
        match self {
            RollupFunc::Count => "COUNT",
            RollupFunc::Sum => "SUM",
            RollupFunc::Avg => "AVG",
            RollupFunc::Min => "MIN",
            RollupFunc::Max => "MAX",
        }
    }
}

/// Computed column projected through a relation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VirtualColumn {
    /// Related rows' `column`, which may itself be a lookup on the related table
    Lookup {
        alias: String,
        relation: RelationRef,
        column: String,
    },
    /// Aggregate of the related rows' `column`
    Rollup {
        alias: String,
        relation: RelationRef,
        column: String,
        func: RollupFunc,
    },
}

impl VirtualColumn {
    pub fn alias(&self) -> &str {
        match self {
            VirtualColumn::Lookup { alias, .. } | VirtualColumn::Rollup { alias, .. } => alias,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_swaps_sides() {
        let hm = Relation::has_many("items", "id", "order_id");
        let bt = hm.mirror("orders");
        assert_eq!(bt, Relation::belongs_to("orders", "order_id", "id"));
        assert_eq!(bt.mirror("items"), hm);

        let mm = Relation::many_to_many(
            "tags",
            "id",
            "id",
            Junction {
                table: "post_tags".into(),
                column: "post_id".into(),
                related_column: "tag_id".into(),
            },
        );
        let back = mm.mirror("posts");
        assert_eq!(back.kind, RelationKind::ManyToMany);
        assert_eq!(back.related, "posts");
        let junction = back.junction.unwrap();
        assert_eq!(junction.column, "tag_id");
        assert_eq!(junction.related_column, "post_id");
    }

    #[test]
    fn deserializes_virtual_columns() {
        let column: VirtualColumn = serde_json::from_str(
            r#"{"type": "rollup", "alias": "Total", "relation": {"kind": "hm", "table": "items"},
                "column": "qty", "func": "sum"}"#,
        )
        .unwrap();
        assert_eq!(column.alias(), "Total");
        assert!(matches!(
            column,
            VirtualColumn::Rollup {
                func: RollupFunc::Sum,
                ..
            }
        ));
    }
}
