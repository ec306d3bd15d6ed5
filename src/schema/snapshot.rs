//! Immutable schema snapshots.
//!
//! A snapshot is built once from every table's metadata: relations are
//! checked against the registered tables and mirrored onto their targets, and
//! lookup chains are planned. Operations hold an `Arc` to the snapshot they
//! started with; schema changes produce a new snapshot instead of mutating
//! this one.

use super::column::Column;
use super::relation::{Relation, RelationRef, VirtualColumn};
use super::table::{LookupPlan, RollupPlan, Table, TableMeta, TableRelation};
use crate::config::ResolutionMode;
use crate::diagnostic::{self, Diagnostic};
use basemodel_core::{BaseModelError, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Every table of one schema version.
#[derive(Debug, Default)]
pub struct SchemaSnapshot {
    version: u64,
    tables: IndexMap<String, Arc<Table>>,
    /// Table alias to physical name
    aliases: HashMap<String, String>,
    diagnostics: Vec<Diagnostic>,
}

impl SchemaSnapshot {
    /// Builds a snapshot. In strict mode an unresolvable relation or lookup
    /// fails the build; in lenient mode it is dropped and reported through
    /// [`diagnostics`](Self::diagnostics).
    pub fn build(version: u64, metas: Vec<TableMeta>, mode: ResolutionMode) -> Result<Self> {
        let mut diagnostics = Vec::new();
        let metas: Vec<TableMeta> = metas.into_iter().map(normalize).collect();

        let mut aliases = HashMap::with_capacity(metas.len());
        for meta in &metas {
            if meta.alias != meta.name {
                aliases.insert(meta.alias.clone(), meta.name.clone());
            }
        }
        let position: HashMap<&str, usize> = metas
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.as_str(), i))
            .collect();
        let find = |name: &str| {
            position
                .get(name)
                .or_else(|| aliases.get(name).and_then(|n| position.get(n.as_str())))
                .copied()
        };

        let mut tables = Vec::with_capacity(metas.len());
        for meta in &metas {
            tables.push(Table::new(
                meta.name.clone(),
                meta.alias.clone(),
                meta.columns.clone(),
            )?);
        }

        // relations, declared and mirrored
        let mut relations: Vec<Vec<TableRelation>> = vec![Vec::new(); metas.len()];
        for (owner, meta) in metas.iter().enumerate() {
            for relation in &meta.relations {
                let Some(target) = find(&relation.related) else {
                    diagnostic::skip(
                        mode,
                        Diagnostic::new(&meta.name, &relation.related, "table not registered"),
                        &mut diagnostics,
                    )?;
                    continue;
                };
                if tables[owner].column(&relation.column).is_none()
                    || tables[target].column(&relation.related_column).is_none()
                {
                    diagnostic::skip(
                        mode,
                        Diagnostic::new(&meta.name, &relation.related, "relation column missing"),
                        &mut diagnostics,
                    )?;
                    continue;
                }
                let mut forward = relation.clone();
                forward.related = metas[target].name.clone();
                forward.column = physical(&tables[owner], &forward.column);
                forward.related_column = physical(&tables[target], &forward.related_column);
                let backward = forward.mirror(&meta.name);

                add_relation(&mut relations[owner], forward, &metas[target].alias);
                add_relation(&mut relations[target], backward, &meta.alias);
            }
        }
        for (table, list) in tables.iter_mut().zip(relations) {
            table.set_relations(list);
        }

        // virtual columns
        let planned = plan_virtuals(&metas, &tables, mode, &mut diagnostics)?;
        for (table, (lookups, rollups)) in tables.iter_mut().zip(planned) {
            table.set_virtuals(lookups, rollups)?;
        }

        let tables = tables
            .into_iter()
            .map(|t| (t.name().to_string(), Arc::new(t)))
            .collect();
        Ok(Self {
            version,
            tables,
            aliases,
            diagnostics,
        })
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Finds a table by physical name or alias.
    pub fn table(&self, name: &str) -> Option<&Arc<Table>> {
        self.tables.get(name).or_else(|| {
            self.aliases
                .get(name)
                .and_then(|physical| self.tables.get(physical))
        })
    }

    pub fn require(&self, name: &str) -> Result<&Arc<Table>> {
        self.table(name)
            .ok_or_else(|| BaseModelError::Schema(format!("table {name} is not registered")))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<Table>> {
        self.tables.values()
    }

    /// Relations and lookups dropped while building the snapshot.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Fills empty aliases with physical names.
fn normalize(mut meta: TableMeta) -> TableMeta {
    if meta.alias.is_empty() {
        meta.alias = meta.name.clone();
    }
    for column in &mut meta.columns {
        if column.alias.is_empty() {
            column.alias = column.name.clone();
        }
    }
    meta
}

fn physical(table: &Table, name: &str) -> String {
    table
        .column(name)
        .map_or_else(|| name.to_string(), |c| c.name.clone())
}

fn add_relation(list: &mut Vec<TableRelation>, relation: Relation, related_alias: &str) {
    if list.iter().any(|r| r.relation == relation) {
        return;
    }
    let property = format!("{related_alias}{}", relation.kind.suffix());
    list.push(TableRelation {
        relation,
        property,
        related_alias: related_alias.to_string(),
    });
}

fn find_relation<'t>(
    tables: &'t [Table],
    owner: usize,
    reference: &RelationRef,
) -> Option<(&'t TableRelation, usize)> {
    let relation = tables[owner].relation(reference.kind, &reference.table)?;
    let target = tables.iter().position(|t| t.name() == relation.related)?;
    Some((relation, target))
}

enum Planned {
    Done(LookupPlan),
    /// Target is a lookup not planned yet
    Waiting,
    Invalid(&'static str),
}

fn plan_lookup(
    metas: &[TableMeta],
    tables: &[Table],
    planned: &[Vec<LookupPlan>],
    owner: usize,
    alias: &str,
    reference: &RelationRef,
    column: &str,
) -> Planned {
    let Some((relation, target)) = find_relation(tables, owner, reference) else {
        return Planned::Invalid("relation not found");
    };
    if let Some(target_column) = tables[target].column(column) {
        return Planned::Done(LookupPlan {
            alias: alias.to_string(),
            hops: vec![relation.relation.clone()],
            column: target_column.name.clone(),
            kind: target_column.kind,
        });
    }
    if let Some(inner) = planned[target].iter().find(|l| l.alias == column) {
        let mut hops = Vec::with_capacity(inner.hops.len() + 1);
        hops.push(relation.relation.clone());
        hops.extend(inner.hops.iter().cloned());
        return Planned::Done(LookupPlan {
            alias: alias.to_string(),
            hops,
            column: inner.column.clone(),
            kind: inner.kind,
        });
    }
    let declared = metas[target]
        .virtual_columns
        .iter()
        .any(|v| matches!(v, VirtualColumn::Lookup { alias, .. } if alias == column));
    if declared {
        Planned::Waiting
    } else {
        Planned::Invalid("lookup target not found")
    }
}

/// Plans rollups directly and lookups by bounded fixed-point iteration:
/// a lookup through another lookup waits until that one is planned.
fn plan_virtuals(
    metas: &[TableMeta],
    tables: &[Table],
    mode: ResolutionMode,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<(Vec<LookupPlan>, Vec<RollupPlan>)>> {
    let mut lookups: Vec<Vec<LookupPlan>> = vec![Vec::new(); tables.len()];
    let mut rollups: Vec<Vec<RollupPlan>> = vec![Vec::new(); tables.len()];
    let mut pending = Vec::new();

    for (owner, meta) in metas.iter().enumerate() {
        for column in &meta.virtual_columns {
            match column {
                VirtualColumn::Lookup {
                    alias,
                    relation,
                    column,
                } => pending.push((owner, alias, relation, column)),
                VirtualColumn::Rollup {
                    alias,
                    relation,
                    column,
                    func,
                } => {
                    let resolved = find_relation(tables, owner, relation).and_then(
                        |(relation, target)| {
                            let column: &Column = tables[target].column(column)?;
                            Some(RollupPlan {
                                alias: alias.clone(),
                                relation: relation.relation.clone(),
                                column: column.name.clone(),
                                func: *func,
                            })
                        },
                    );
                    match resolved {
                        Some(plan) => rollups[owner].push(plan),
                        None => diagnostic::skip(
                            mode,
                            Diagnostic::new(&meta.name, alias, "rollup target not found"),
                            diagnostics,
                        )?,
                    }
                }
            }
        }
    }

    let max_passes = pending.len() + 1;
    let mut passes = 0;
    while !pending.is_empty() && passes < max_passes {
        passes += 1;
        let before = pending.len();
        for (owner, alias, relation, column) in std::mem::take(&mut pending) {
            match plan_lookup(metas, tables, &lookups, owner, alias, relation, column) {
                Planned::Done(plan) => lookups[owner].push(plan),
                Planned::Waiting => pending.push((owner, alias, relation, column)),
                Planned::Invalid(reason) => diagnostic::skip(
                    mode,
                    Diagnostic::new(tables[owner].name(), alias, reason),
                    diagnostics,
                )?,
            }
        }
        if pending.len() == before {
            break;
        }
    }
    tracing::debug!(passes, unresolved = pending.len(), "basemodel.lookup.plan");

    for (owner, alias, _, column) in pending {
        diagnostic::skip(
            mode,
            Diagnostic::new(
                tables[owner].name(),
                alias,
                format!("lookup target {column} never resolved"),
            ),
            diagnostics,
        )?;
    }

    Ok(lookups.into_iter().zip(rollups).collect())
}
