//! Name resolution for generated statements.
//!
//! [`TableResolver`] maps the column names used in filters, sorts and
//! `having` clauses to qualified physical references. Condition-graph paths
//! that walk relations (`items.qty`) become correlated `EXISTS` subqueries
//! whose joined tables are aliased `<n>___<table>`, so one statement can
//! reference the same table through several paths.

use crate::args::{Fields, Sort};
use crate::schema::{LookupPlan, Relation, RelationKind, RollupPlan, SchemaSnapshot, Table};
use basemodel_core::filter::HopKind;
use basemodel_core::{
    BaseModelError, ColumnRef, ColumnResolver, Dialect, OrderBy, ResolvedColumn, Result, SQL,
    SelectQuery, Token,
};
use basemodel_types::StorageClass;

// ============================================================================
// TableResolver
// ============================================================================

pub struct TableResolver<'a> {
    snapshot: &'a SchemaSnapshot,
    table: &'a Table,
    qualifier: &'a str,
    dialect: Dialect,
    /// Computed names valid in this statement (`count`, aggregate aliases)
    extras: Vec<(String, SQL, StorageClass)>,
    counter: usize,
    /// Hops of the last resolved relation path, consumed by `scope`
    pending: Vec<(Relation, String)>,
}

impl<'a> TableResolver<'a> {
    pub fn new(snapshot: &'a SchemaSnapshot, table: &'a Table, dialect: Dialect) -> Self {
        Self {
            snapshot,
            table,
            qualifier: table.name(),
            dialect,
            extras: Vec::new(),
            counter: 0,
            pending: Vec::new(),
        }
    }

    /// Makes `name` resolvable to `sql`; used for aggregate aliases in
    /// `having` and `sort`.
    pub fn extra(mut self, name: impl Into<String>, sql: SQL, class: StorageClass) -> Self {
        self.extras.push((name.into(), sql, class));
        self
    }

    fn local(&self, name: &str) -> Result<ResolvedColumn> {
        if let Some(column) = self.table.column(name) {
            return Ok(ResolvedColumn {
                sql: SQL::qualified(self.qualifier, column.name.as_str()),
                class: column.class(),
            });
        }
        if let Some(rollup) = self.table.rollup(name) {
            return Ok(ResolvedColumn {
                sql: rollup_sql(self.snapshot, rollup, self.qualifier, self.dialect)?.parens(),
                class: StorageClass::Real,
            });
        }
        if let Some((_, sql, class)) = self.extras.iter().find(|(n, ..)| n == name) {
            return Ok(ResolvedColumn {
                sql: sql.clone(),
                class: *class,
            });
        }
        Err(BaseModelError::query(format!(
            "{name} : column not found in {}",
            self.table.alias()
        )))
    }

    /// ORDER BY items for `sort`. Unknown names fail.
    pub fn order(&mut self, sort: &Sort) -> Result<Vec<(SQL, OrderBy)>> {
        match sort {
            Sort::Default => Ok(Vec::new()),
            Sort::Explicit(keys) => keys
                .iter()
                .map(|(name, direction)| Ok((self.local(name)?.sql, *direction)))
                .collect(),
        }
    }

    /// Key columns, or the first column, ascending; the implicit order on
    /// dialects that cannot paginate unordered.
    pub fn default_order(&self) -> Vec<(SQL, OrderBy)> {
        let keys: Vec<_> = self
            .table
            .primary_keys()
            .map(|c| (SQL::qualified(self.qualifier, c.name.as_str()), OrderBy::Asc))
            .collect();
        if !keys.is_empty() {
            return keys;
        }
        self.table
            .columns()
            .first()
            .map(|c| vec![(SQL::qualified(self.qualifier, c.name.as_str()), OrderBy::Asc)])
            .unwrap_or_default()
    }
}

impl ColumnResolver for TableResolver<'_> {
    fn resolve(&mut self, column: &ColumnRef) -> Result<ResolvedColumn> {
        self.pending.clear();
        if column.path.is_empty() {
            return self.local(&column.name);
        }

        let snapshot = self.snapshot;
        let mut current: &Table = self.table;
        let mut hops = Vec::with_capacity(column.path.len());
        for hop in &column.path {
            let kind = match hop.kind {
                HopKind::HasMany => RelationKind::HasMany,
                HopKind::BelongsTo => RelationKind::BelongsTo,
            };
            let relation = current.relation(kind, &hop.table).ok_or_else(|| {
                BaseModelError::query(format!(
                    "{} : relation not found in {}",
                    hop.table,
                    current.alias()
                ))
            })?;
            let next: &Table = snapshot.require(&relation.related)?;
            self.counter += 1;
            hops.push((
                relation.relation.clone(),
                format!("{}___{}", self.counter, next.name()),
            ));
            current = next;
        }

        let target = current.require_column(&column.name)?;
        let alias = hops.last().map(|(_, a)| a.clone()).unwrap_or_default();
        self.pending = hops;
        Ok(ResolvedColumn {
            sql: SQL::qualified(alias, target.name.as_str()),
            class: target.class(),
        })
    }

    fn scope(&mut self, column: &ColumnRef, predicate: SQL) -> Result<SQL> {
        if column.path.is_empty() {
            return Ok(predicate);
        }
        let hops = std::mem::take(&mut self.pending);
        let Some(((first, first_alias), rest)) = hops.split_first() else {
            return Ok(predicate);
        };

        let mut query = SelectQuery::from_aliased(first.related.as_str(), first_alias.as_str())
            .column(SQL::raw("1"));
        let mut previous = first_alias;
        for (relation, alias) in rest {
            query = query.inner_join(
                relation.related.as_str(),
                Some(alias),
                link(previous, relation, alias),
            );
            previous = alias;
        }
        let query = query
            .filter(link(self.qualifier, first, first_alias))
            .filter(predicate);
        Ok(SQL::raw("EXISTS").append(query.to_sql(self.dialect).parens()))
    }
}

/// `"owner"."column" = "related"."related_column"`
pub(crate) fn link(owner: &str, relation: &Relation, related: &str) -> SQL {
    SQL::qualified(owner, relation.column.as_str())
        .push(Token::EQ)
        .append(SQL::qualified(related, relation.related_column.as_str()))
}

// ============================================================================
// Rollups
// ============================================================================

/// Correlated subquery computing `rollup` for the row referenced by
/// `qualifier`.
pub(crate) fn rollup_sql(
    snapshot: &SchemaSnapshot,
    rollup: &RollupPlan,
    qualifier: &str,
    dialect: Dialect,
) -> Result<SQL> {
    const ALIAS: &str = "__rollup";
    const JUNCTION: &str = "__junction";
    let relation = &rollup.relation;
    let related = snapshot.require(&relation.related)?;
    let target = related.require_column(&rollup.column)?;

    let value = SQL::func(
        rollup.func.sql_name(),
        SQL::qualified(ALIAS, target.name.as_str()),
    );
    let query = SelectQuery::from_aliased(related.name(), ALIAS).column(value);
    let query = match &relation.junction {
        Some(junction) => query
            .inner_join(
                junction.table.as_str(),
                Some(JUNCTION),
                SQL::qualified(JUNCTION, junction.related_column.as_str())
                    .push(Token::EQ)
                    .append(SQL::qualified(ALIAS, relation.related_column.as_str())),
            )
            .filter(
                SQL::qualified(JUNCTION, junction.column.as_str())
                    .push(Token::EQ)
                    .append(SQL::qualified(qualifier, relation.column.as_str())),
            ),
        None => query.filter(link(qualifier, relation, ALIAS)),
    };
    Ok(query.to_sql(dialect))
}

// ============================================================================
// Projection
// ============================================================================

/// SELECT list of one table plus the lookups to attach afterwards.
#[derive(Debug)]
pub(crate) struct Projection<'t> {
    pub columns: Vec<SQL>,
    /// Lookups to attach, with the row key holding the first hop's value
    pub lookups: Vec<(&'t LookupPlan, String)>,
    /// Keys fetched only to join lookups
    pub hidden: Vec<String>,
}

impl Projection<'_> {
    /// Drops the keys that were only fetched for lookups.
    pub fn strip(&self, rows: &mut [basemodel_core::Row]) {
        if self.hidden.is_empty() {
            return;
        }
        for row in rows {
            for key in &self.hidden {
                row.shift_remove(key);
            }
        }
    }
}

/// Aliased column list for `fields`. Explicit lists are checked against
/// the table's columns and virtual columns.
pub(crate) fn projection<'t>(
    snapshot: &SchemaSnapshot,
    table: &'t Table,
    fields: &Fields,
    qualifier: &str,
    dialect: Dialect,
) -> Result<Projection<'t>> {
    let mut columns = Vec::new();
    let mut selected: Vec<&str> = Vec::new();
    let mut lookups: Vec<&'t LookupPlan> = Vec::new();

    match fields {
        Fields::All => {
            for column in table.columns() {
                selected.push(&column.name);
            }
            for rollup in table.rollups() {
                columns.push(
                    rollup_sql(snapshot, rollup, qualifier, dialect)?
                        .parens()
                        .alias(rollup.alias.as_str()),
                );
            }
            lookups.extend(table.lookups());
        }
        Fields::List(names) => {
            for name in names {
                if let Some(column) = table.column(name) {
                    if !selected.contains(&column.name.as_str()) {
                        selected.push(&column.name);
                    }
                } else if let Some(rollup) = table.rollup(name) {
                    columns.push(
                        rollup_sql(snapshot, rollup, qualifier, dialect)?
                            .parens()
                            .alias(rollup.alias.as_str()),
                    );
                } else if let Some(lookup) = table.lookup(name) {
                    if !lookups.iter().any(|l| l.alias == lookup.alias) {
                        lookups.push(lookup);
                    }
                } else {
                    return Err(BaseModelError::query(format!(
                        "{name} : column not found in {}",
                        table.alias()
                    )));
                }
            }
        }
    }

    let mut projection = Projection {
        columns: Vec::with_capacity(selected.len() + columns.len()),
        lookups: Vec::with_capacity(lookups.len()),
        hidden: Vec::new(),
    };
    for name in &selected {
        if let Some(column) = table.column(name) {
            projection.columns.push(
                SQL::qualified(qualifier, column.name.as_str()).alias(column.alias.as_str()),
            );
        }
    }
    projection.columns.extend(columns);

    for lookup in lookups {
        let Some(first) = lookup.hops.first() else {
            continue;
        };
        let key = match table.column(&first.column) {
            Some(column) if selected.contains(&column.name.as_str()) => column.alias.clone(),
            _ => {
                let key = format!("__{}", first.column);
                if !projection.hidden.contains(&key) {
                    projection.columns.push(
                        SQL::qualified(qualifier, first.column.as_str()).alias(key.as_str()),
                    );
                    projection.hidden.push(key.clone());
                }
                key
            }
        };
        projection.lookups.push((lookup, key));
    }
    Ok(projection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolutionMode;
    use crate::schema::{Column, RelationRef, RollupFunc, TableMeta, VirtualColumn};
    use basemodel_core::filter::parse_condition;
    use basemodel_core::parse_where;
    use basemodel_types::ColumnType;
    use serde_json::json;

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot::build(
            1,
            vec![
                TableMeta::new("orders")
                    .column(Column::id("id"))
                    .column(Column::new("title", ColumnType::SingleLineText).alias("Title"))
                    .relation(Relation::has_many("items", "id", "order_id"))
                    .virtual_column(VirtualColumn::Rollup {
                        alias: "Units".into(),
                        relation: RelationRef::new(RelationKind::HasMany, "items"),
                        column: "qty".into(),
                        func: RollupFunc::Sum,
                    })
                    .virtual_column(VirtualColumn::Lookup {
                        alias: "Skus".into(),
                        relation: RelationRef::new(RelationKind::HasMany, "items"),
                        column: "sku".into(),
                    }),
                TableMeta::new("items")
                    .column(Column::id("id"))
                    .column(Column::new("order_id", ColumnType::ForeignKey))
                    .column(Column::new("sku", ColumnType::SingleLineText))
                    .column(Column::new("qty", ColumnType::Number)),
            ],
            ResolutionMode::Strict,
        )
        .unwrap()
    }

    #[test]
    fn qualifies_by_alias() {
        let snapshot = snapshot();
        let orders = snapshot.require("orders").unwrap();
        let expr = parse_where("(Title,eq,x)").unwrap().unwrap();
        let mut resolver = TableResolver::new(&snapshot, orders, Dialect::SQLite);
        let sql = expr.to_sql(&mut resolver, Dialect::SQLite).unwrap();
        assert_eq!(sql.sql(Dialect::SQLite), r#""orders"."title" = ?"#);

        let unknown = parse_where("(nope,eq,1)").unwrap().unwrap();
        assert!(matches!(
            unknown.to_sql(&mut resolver, Dialect::SQLite),
            Err(BaseModelError::Query(_))
        ));
    }

    #[test]
    fn relation_paths_become_exists() {
        let snapshot = snapshot();
        let orders = snapshot.require("orders").unwrap();
        let expr = parse_condition(&json!({
            "items": {"relationType": "hm", "qty": {"gt": 2}}
        }))
        .unwrap()
        .unwrap();
        let mut resolver = TableResolver::new(&snapshot, orders, Dialect::SQLite);
        let sql = expr.to_sql(&mut resolver, Dialect::SQLite).unwrap();
        assert_eq!(
            sql.sql(Dialect::SQLite),
            r#"EXISTS(SELECT 1 FROM "items" AS "1___items" WHERE ("orders"."id" = "1___items"."order_id") AND ("1___items"."qty" > ?))"#
        );
    }

    #[test]
    fn projection_includes_virtuals() {
        let snapshot = snapshot();
        let orders = snapshot.require("orders").unwrap();
        let all = projection(&snapshot, orders, &Fields::All, "orders", Dialect::SQLite).unwrap();
        let text = SQL::join(all.columns.clone(), Token::COMMA).sql(Dialect::SQLite);
        assert!(text.starts_with(r#""orders"."id" AS "id", "orders"."title" AS "Title""#));
        assert!(text.contains(r#"SUM("__rollup"."qty")"#));
        assert!(text.ends_with(r#"AS "Units""#));
        assert_eq!(all.lookups.len(), 1);
        assert_eq!(all.lookups[0].1, "id");
        assert!(all.hidden.is_empty());

        // lookup without its join key selected fetches the key hidden
        let fields = Fields::List(vec!["Title".into(), "Skus".into()]);
        let partial = projection(&snapshot, orders, &fields, "orders", Dialect::SQLite).unwrap();
        assert_eq!(partial.hidden, ["__id"]);

        let bad = Fields::List(vec!["missing".into()]);
        assert!(projection(&snapshot, orders, &bad, "orders", Dialect::SQLite).is_err());
    }

    #[test]
    fn sorts_resolve_extras() {
        let snapshot = snapshot();
        let orders = snapshot.require("orders").unwrap();
        let mut resolver = TableResolver::new(&snapshot, orders, Dialect::SQLite).extra(
            "count",
            SQL::raw("COUNT(*)"),
            StorageClass::Integer,
        );
        let order = resolver
            .order(&Sort::parse("-count,Title"))
            .unwrap();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0].1, OrderBy::Desc);
        assert!(resolver.order(&Sort::parse("bogus")).is_err());
    }
}
