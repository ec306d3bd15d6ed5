use super::column::Column;
use super::relation::{Relation, RelationKind, RollupFunc, VirtualColumn};
use basemodel_core::{BaseModelError, Result};
use basemodel_types::ColumnType;
use serde::Deserialize;
use std::collections::HashMap;
use std::ops::Deref;

// ============================================================================
// Metadata
// ============================================================================

/// Table description as supplied by a [`MetadataProvider`](super::MetadataProvider).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableMeta {
    #[serde(alias = "tn")]
    pub name: String,
    #[serde(alias = "_tn", default)]
    pub alias: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default, alias = "virtual")]
    pub virtual_columns: Vec<VirtualColumn>,
}

impl TableMeta {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            ..Default::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn virtual_column(mut self, column: VirtualColumn) -> Self {
        self.virtual_columns.push(column);
        self
    }
}

// ============================================================================
// Runtime handle
// ============================================================================

/// A relation together with the nested property its rows are attached under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRelation {
    pub relation: Relation,
    /// `<relatedAlias>List`, `<relatedAlias>Read` or `<relatedAlias>MMList`
    pub property: String,
    pub related_alias: String,
}

impl Deref for TableRelation {
    type Target = Relation;

    fn deref(&self) -> &Relation {
        &self.relation
    }
}

/// Lookup column resolved into the chain of relations it walks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupPlan {
    pub alias: String,
    /// Relations from this table to the table owning `column`
    pub hops: Vec<Relation>,
    /// Physical column on the last hop's table
    pub column: String,
    pub kind: ColumnType,
}

impl LookupPlan {
    /// Every hop is belongs-to, so each row sees at most one value.
    pub fn is_scalar(&self) -> bool {
        self.hops.iter().all(Relation::is_to_one)
    }
}

/// Rollup column resolved to one relation and physical column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupPlan {
    pub alias: String,
    pub relation: Relation,
    pub column: String,
    pub func: RollupFunc,
}

/// Runtime handle of one table within a [`SchemaSnapshot`](super::SchemaSnapshot).
#[derive(Debug)]
pub struct Table {
    name: String,
    alias: String,
    columns: Vec<Column>,
    /// Alias and physical name to column index
    index: HashMap<String, usize>,
    primary_keys: Vec<usize>,
    primary_value: Option<usize>,
    relations: Vec<TableRelation>,
    lookups: Vec<LookupPlan>,
    rollups: Vec<RollupPlan>,
}

impl Table {
    /// Checks column invariants and indexes the columns.
    pub(crate) fn new(name: String, alias: String, columns: Vec<Column>) -> Result<Self> {
        let mut index = HashMap::with_capacity(columns.len() * 2);
        let mut primary_value = None;
        for (i, column) in columns.iter().enumerate() {
            for key in [&column.name, &column.alias] {
                match index.insert(key.clone(), i) {
                    Some(previous) if previous != i => {
                        return Err(BaseModelError::Schema(format!(
                            "{name}: column name {key} is used twice"
                        )));
                    }
                    _ => {}
                }
            }
            if column.primary_value {
                if primary_value.is_some() {
                    return Err(BaseModelError::Schema(format!(
                        "{name}: more than one primary value column"
                    )));
                }
                primary_value = Some(i);
            }
        }
        let primary_keys = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            name,
            alias,
            columns,
            index,
            primary_keys,
            primary_value,
            relations: Vec::new(),
            lookups: Vec::new(),
            rollups: Vec::new(),
        })
    }

    pub(crate) fn set_relations(&mut self, relations: Vec<TableRelation>) {
        self.relations = relations;
    }

    pub(crate) fn set_virtuals(
        &mut self,
        lookups: Vec<LookupPlan>,
        rollups: Vec<RollupPlan>,
    ) -> Result<()> {
        let aliases = lookups
            .iter()
            .map(|l| l.alias.as_str())
            .chain(rollups.iter().map(|r| r.alias.as_str()));
        let mut seen = std::collections::HashSet::new();
        for alias in aliases {
            if self.index.contains_key(alias)
                || self.relations.iter().any(|r| r.property == alias)
                || !seen.insert(alias)
            {
                return Err(BaseModelError::Schema(format!(
                    "{}: virtual column {alias} collides with another column",
                    self.name
                )));
            }
        }
        self.lookups = lookups;
        self.rollups = rollups;
        Ok(())
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Finds a column by alias or physical name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    /// Like [`column`](Self::column), failing with a query error.
    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| {
            BaseModelError::query(format!("{name} : column not found in {}", self.alias))
        })
    }

    pub fn primary_keys(&self) -> impl ExactSizeIterator<Item = &Column> + Clone {
        self.primary_keys.iter().map(|&i| &self.columns[i])
    }

    /// First primary key column.
    pub fn primary_key(&self) -> Option<&Column> {
        self.primary_keys.first().map(|&i| &self.columns[i])
    }

    pub fn primary_value(&self) -> Option<&Column> {
        self.primary_value.map(|i| &self.columns[i])
    }

    #[inline]
    pub fn relations(&self) -> &[TableRelation] {
        &self.relations
    }

    pub fn relations_of(&self, kind: RelationKind) -> impl Iterator<Item = &TableRelation> {
        self.relations.iter().filter(move |r| r.kind == kind)
    }

    /// Relation of `kind` to the table named (physically or by alias) `table`.
    pub fn relation(&self, kind: RelationKind, table: &str) -> Option<&TableRelation> {
        self.relations
            .iter()
            .find(|r| r.kind == kind && (r.related == table || r.related_alias == table))
    }

    /// Relation whose nested property is `property`.
    pub fn relation_by_property(&self, property: &str) -> Option<&TableRelation> {
        self.relations.iter().find(|r| r.property == property)
    }

    #[inline]
    pub fn lookups(&self) -> &[LookupPlan] {
        &self.lookups
    }

    pub fn lookup(&self, alias: &str) -> Option<&LookupPlan> {
        self.lookups.iter().find(|l| l.alias == alias)
    }

    #[inline]
    pub fn rollups(&self) -> &[RollupPlan] {
        &self.rollups
    }

    pub fn rollup(&self, alias: &str) -> Option<&RollupPlan> {
        self.rollups.iter().find(|r| r.alias == alias)
    }

    /// Whether `name` is a lookup or rollup alias.
    pub fn is_virtual(&self, name: &str) -> bool {
        self.lookup(name).is_some() || self.rollup(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<Column> {
        vec![
            Column::id("id"),
            Column::new("title", ColumnType::SingleLineText)
                .alias("Title")
                .primary_value(),
        ]
    }

    #[test]
    fn indexes_alias_and_name() {
        let table = Table::new("orders".into(), "Orders".into(), columns()).unwrap();
        assert_eq!(table.column("Title").unwrap().name, "title");
        assert_eq!(table.column("title").unwrap().alias, "Title");
        assert_eq!(table.primary_key().unwrap().name, "id");
        assert_eq!(table.primary_value().unwrap().name, "title");
        assert!(table.require_column("nope").is_err());
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut cols = columns();
        cols.push(Column::new("other", ColumnType::Number).alias("Title"));
        assert!(matches!(
            Table::new("orders".into(), "orders".into(), cols),
            Err(BaseModelError::Schema(_))
        ));
    }

    #[test]
    fn rejects_two_primary_values() {
        let mut cols = columns();
        cols.push(Column::new("code", ColumnType::SingleLineText).primary_value());
        assert!(Table::new("orders".into(), "orders".into(), cols).is_err());
    }

    #[test]
    fn virtual_aliases_must_be_unique() {
        let mut table = Table::new("orders".into(), "orders".into(), columns()).unwrap();
        let rollup = RollupPlan {
            alias: "Title".into(),
            relation: Relation::has_many("items", "id", "order_id"),
            column: "qty".into(),
            func: RollupFunc::Sum,
        };
        assert!(table.set_virtuals(Vec::new(), vec![rollup]).is_err());
    }
}
