//! Nested relation reads and links.
//!
//! Related rows of a whole page are fetched with one statement per
//! relation: has-many and many-to-many build one bounded branch per parent
//! and UNION ALL them so every parent keeps its own page; belongs-to is a
//! single `IN (...)` query. Relations run concurrently.

use super::{BaseModel, Ctx, Resolved};
use crate::args::{ListArgs, QueryArgs, default_nested, relation_names};
use crate::diagnostic::{self, Diagnostic};
use crate::pk::pk_filter;
use crate::schema::{Relation, RelationKind, Table, TableRelation};
use basemodel_core::helpers::{and, eq, in_list};
use basemodel_core::{
    BaseModelError, Connection, DeleteQuery, InsertQuery, Result, Row, SQL, SelectQuery, Token,
    UpdateQuery, Value, union_all,
};
use futures_util::future::try_join_all;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

const PARENT: &str = "__parent";
const INDEX: &str = "__index";

const KINDS: [RelationKind; 3] = [
    RelationKind::HasMany,
    RelationKind::BelongsTo,
    RelationKind::ManyToMany,
];

/// Related rows of one relation keyed by the owner's join value.
enum Groups {
    Many(HashMap<String, Vec<Row>>),
    One(HashMap<String, Row>),
}

struct Job<'t> {
    relation: &'t TableRelation,
    related: &'t Table,
    args: ListArgs,
    /// Alias of the owner column carrying the join value
    key: String,
}

// ============================================================================
// Batched resolution
// ============================================================================

impl<'a> Ctx<'a> {
    /// Attaches the relations `args` names (`hm`, `bt`, `mm`) to `rows`.
    /// Unknown relations and unregistered tables are skipped according to
    /// the resolution mode.
    pub async fn resolve_relations(
        &self,
        table: &'a Table,
        rows: &mut [Row],
        args: &QueryArgs,
    ) -> Result<Vec<Diagnostic>> {
        let mode = self.config.resolution;
        let mut diagnostics = Vec::new();
        let mut jobs = Vec::new();

        for kind in KINDS {
            for (index, name) in relation_names(args, kind).into_iter().enumerate() {
                let Some(relation) = table.relation(kind, &name) else {
                    let diag = Diagnostic::new(table.name(), name, "relation not found");
                    diagnostic::skip(mode, diag, &mut diagnostics)?;
                    continue;
                };
                let Some(related) = self.snapshot.table(&relation.related) else {
                    let diag = Diagnostic::new(
                        table.name(),
                        relation.property.as_str(),
                        "table not registered",
                    );
                    diagnostic::skip(mode, diag, &mut diagnostics)?;
                    continue;
                };
                let Some(owner) = table.column(&relation.column) else {
                    let diag = Diagnostic::new(
                        table.name(),
                        relation.property.as_str(),
                        format!("join column {} missing", relation.column),
                    );
                    diagnostic::skip(mode, diag, &mut diagnostics)?;
                    continue;
                };
                jobs.push(Job {
                    relation,
                    related: &**related,
                    args: ListArgs::child(args, kind, index, related, self.config)?,
                    key: owner.alias.clone(),
                });
            }
        }
        if rows.is_empty() || jobs.is_empty() {
            return Ok(diagnostics);
        }

        let keys: Vec<Vec<Value>> = jobs.iter().map(|job| join_keys(rows, &job.key)).collect();
        let groups = try_join_all(
            jobs.iter()
                .zip(keys)
                .map(|(job, keys)| self.related_groups(job, keys)),
        )
        .await?;

        for (job, groups) in jobs.iter().zip(groups) {
            for row in rows.iter_mut() {
                let key = row.get(&job.key).and_then(Value::key_string);
                let value = match &groups {
                    Groups::Many(map) => Value::List(
                        key.and_then(|k| map.get(&k))
                            .cloned()
                            .unwrap_or_default(),
                    ),
                    Groups::One(map) => key
                        .and_then(|k| map.get(&k))
                        .cloned()
                        .map_or(Value::Null, |r| Value::Object(Box::new(r))),
                };
                row.insert(job.relation.property.clone(), value);
            }
        }
        Ok(diagnostics)
    }

    async fn related_groups(&self, job: &Job<'a>, keys: Vec<Value>) -> Result<Groups> {
        Ok(match job.relation.kind {
            RelationKind::HasMany => {
                Groups::Many(self.has_many_groups(job.related, job.relation, &job.args, keys).await?)
            }
            RelationKind::BelongsTo => {
                Groups::One(self.belongs_to_groups(job.related, job.relation, &job.args, keys).await?)
            }
            RelationKind::ManyToMany => Groups::Many(
                self.many_to_many_groups(job.related, job.relation, &job.args, keys)
                    .await?,
            ),
        })
    }

    /// One page of `child` rows per key, in a single UNION ALL statement.
    pub(crate) async fn has_many_groups(
        &self,
        child: &'a Table,
        relation: &Relation,
        args: &ListArgs,
        keys: Vec<Value>,
    ) -> Result<HashMap<String, Vec<Row>>> {
        let fk = child.require_column(&relation.related_column)?;
        let mut args = args.clone();
        args.fields.ensure(child, &fk.name);

        let dialect = self.dialect();
        let mut branches = Vec::with_capacity(keys.len());
        let mut projection = None;
        for key in keys {
            let scope = eq(SQL::qualified(child.name(), fk.name.as_str()), key);
            let (query, p) = self.select(child, &args, Some(scope), true)?;
            branches.push(query.to_sql(dialect));
            projection.get_or_insert(p);
        }
        let Some(projection) = projection else {
            return Ok(HashMap::new());
        };
        let rows = self.fetch(&union_all(branches, dialect), &projection).await?;
        Ok(group(rows, &fk.alias, false))
    }

    /// Parents referenced by `keys`, unpaginated.
    async fn belongs_to_groups(
        &self,
        parent: &'a Table,
        relation: &Relation,
        args: &ListArgs,
        keys: Vec<Value>,
    ) -> Result<HashMap<String, Row>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let target = parent.require_column(&relation.related_column)?;
        let mut list = ListArgs {
            fields: args.fields.clone(),
            ..Default::default()
        };
        list.fields.ensure(parent, &target.name);

        let scope = in_list(SQL::qualified(parent.name(), target.name.as_str()), keys);
        let (mut query, projection) = self.select(parent, &list, Some(scope), false)?;
        query.limit = None;
        query.offset = 0;
        let rows = self.fetch(&query.to_sql(self.dialect()), &projection).await?;

        let mut out = HashMap::new();
        for row in rows {
            if let Some(key) = row.get(&target.alias).and_then(Value::key_string) {
                out.entry(key).or_insert(row);
            }
        }
        Ok(out)
    }

    /// One page of `related` rows per key, joined through the junction.
    async fn many_to_many_groups(
        &self,
        related: &'a Table,
        relation: &Relation,
        args: &ListArgs,
        keys: Vec<Value>,
    ) -> Result<HashMap<String, Vec<Row>>> {
        let junction = relation.junction.as_ref().ok_or_else(|| {
            BaseModelError::Schema(format!("{} relation has no junction table", relation.related))
        })?;
        let owner = SQL::qualified(junction.table.as_str(), junction.column.as_str());
        let on = SQL::qualified(junction.table.as_str(), junction.related_column.as_str())
            .push(Token::EQ)
            .append(SQL::qualified(related.name(), relation.related_column.as_str()));

        let dialect = self.dialect();
        let mut branches = Vec::with_capacity(keys.len());
        let mut projection = None;
        for key in keys {
            let (query, p) = self.select(related, args, Some(eq(owner.clone(), key)), true)?;
            let mut query = query.inner_join(junction.table.as_str(), None, on.clone());
            query.columns.push(owner.clone().alias(PARENT));
            branches.push(query.to_sql(dialect));
            projection.get_or_insert(p);
        }
        let Some(projection) = projection else {
            return Ok(HashMap::new());
        };
        let rows = self.fetch(&union_all(branches, dialect), &projection).await?;
        Ok(group(rows, PARENT, true))
    }
}

/// Distinct non-null values under `key`.
fn join_keys(rows: &[Row], key: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(key))
        .filter(|v| v.key_string().is_some_and(|k| seen.insert(k)))
        .cloned()
        .collect()
}

fn group(rows: Vec<Row>, key: &str, remove: bool) -> HashMap<String, Vec<Row>> {
    let mut out: HashMap<String, Vec<Row>> = HashMap::new();
    for mut row in rows {
        let value = if remove {
            row.shift_remove(key)
        } else {
            row.get(key).cloned()
        };
        if let Some(k) = value.as_ref().and_then(Value::key_string) {
            out.entry(k).or_default().push(row);
        }
    }
    out
}

// ============================================================================
// Relation reads
// ============================================================================

impl BaseModel {
    /// Selects the owner columns the requested relations join on.
    pub(crate) fn relation_fields(&self, list: &mut ListArgs, args: &QueryArgs) {
        for kind in KINDS {
            for name in relation_names(args, kind) {
                if let Some(relation) = self.table.relation(kind, &name) {
                    list.fields.ensure(&self.table, &relation.column);
                }
            }
        }
    }

    async fn list_with_relations(
        &self,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Resolved<Vec<Row>>> {
        let mut list = ListArgs::parse(args, &self.table, &self.config)?;
        self.relation_fields(&mut list, args);
        let cx = self.cx(self.conn(tx));
        let mut rows = cx.list(&self.table, &list, None).await?;
        let diagnostics = cx.resolve_relations(&self.table, &mut rows, args).await?;
        Ok(Resolved {
            data: rows,
            diagnostics,
        })
    }

    /// Rows with the relations `args` names, or every relation by default.
    pub async fn nested_list(
        &self,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Resolved<Vec<Row>>> {
        let args = args.over(&default_nested(&self.table));
        self.traced("nested_list", self.list_with_relations(&args, tx))
            .await
    }

    /// Rows with only the has-many relations listed in `hm`.
    pub async fn has_many_list(
        &self,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Resolved<Vec<Row>>> {
        let args = args.clone().with("bt", "").with("mm", "");
        self.traced("has_many_list", self.list_with_relations(&args, tx))
            .await
    }

    /// Rows with only the belongs-to relations listed in `bt`.
    pub async fn belongs_to(
        &self,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Resolved<Vec<Row>>> {
        let args = args.clone().with("hm", "").with("mm", "");
        self.traced("belongs_to", self.list_with_relations(&args, tx))
            .await
    }

    /// Row `id` with the relations `args` names, or every relation by
    /// default. Empty when the row does not exist.
    pub async fn nested_read(
        &self,
        id: &str,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Resolved<Row>> {
        let args = args.over(&default_nested(&self.table));
        self.traced("nested_read", self.read_nested(id, &args, self.conn(tx)))
            .await
    }

    pub(crate) async fn read_nested(
        &self,
        id: &str,
        args: &QueryArgs,
        conn: &dyn Connection,
    ) -> Result<Resolved<Row>> {
        let parsed = ListArgs::parse(args, &self.table, &self.config)?;
        let mut list = ListArgs {
            fields: parsed.fields,
            condition_graph: parsed.condition_graph,
            limit: 1,
            ..Default::default()
        };
        self.relation_fields(&mut list, args);

        let cx = self.cx(conn);
        let scope = pk_filter(&self.table, Some(self.table.name()), id)?;
        let mut rows = cx.list(&self.table, &list, Some(scope)).await?;
        let diagnostics = cx.resolve_relations(&self.table, &mut rows, args).await?;
        Ok(Resolved {
            data: rows.into_iter().next().unwrap_or_default(),
            diagnostics,
        })
    }

    /// Rows of `child` whose foreign key references `parent_id`.
    pub async fn has_many_children(
        &self,
        child: &str,
        parent_id: &str,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Vec<Row>> {
        self.traced("has_many_children", async {
            let relation = self.require_relation(RelationKind::HasMany, child)?;
            let child = self.snapshot.require(&relation.related)?;
            let owner = self.table.require_column(&relation.column)?;
            let fk = child.require_column(&relation.related_column)?;

            let list = ListArgs::parse(args, child, &self.config)?;
            let scope = eq(
                SQL::qualified(child.name(), fk.name.as_str()),
                Value::from(parent_id).coerce(owner.class()),
            );
            self.cx(self.conn(tx)).list(child, &list, Some(scope)).await
        })
        .await
    }

    /// Children of each of `ids`, paginated per parent. Every id is present
    /// in the result, with an empty list when it has no children.
    pub async fn has_many_list_gql(
        &self,
        child: &str,
        ids: &[String],
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<IndexMap<String, Vec<Row>>> {
        self.traced("has_many_list_gql", async {
            let relation = self.require_relation(RelationKind::HasMany, child)?;
            let child = self.snapshot.require(&relation.related)?;
            let owner = self.table.require_column(&relation.column)?;
            let list = ListArgs::parse(args, child, &self.config)?;

            let keys: Vec<(String, Value)> = ids
                .iter()
                .map(|id| (id.clone(), Value::from(id.as_str()).coerce(owner.class())))
                .collect();
            let mut groups = self
                .cx(self.conn(tx))
                .has_many_groups(child, relation, &list, keys.iter().map(|(_, v)| v.clone()).collect())
                .await?;
            Ok(keys
                .into_iter()
                .map(|(id, value)| {
                    let rows = value
                        .key_string()
                        .and_then(|k| groups.remove(&k))
                        .unwrap_or_default();
                    (id, rows)
                })
                .collect())
        })
        .await
    }

    /// Number of `child` rows per parent id, in one statement.
    pub async fn has_many_list_count(
        &self,
        child: &str,
        ids: &[String],
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<IndexMap<String, i64>> {
        self.traced("has_many_list_count", async {
            let relation = self.require_relation(RelationKind::HasMany, child)?;
            let child = self.snapshot.require(&relation.related)?;
            let owner = self.table.require_column(&relation.column)?;
            let fk = SQL::qualified(child.name(), child.require_column(&relation.related_column)?.name.as_str());

            let conn = self.conn(tx);
            let cx = self.cx(conn);
            let dialect = conn.dialect();
            let list = ListArgs::parse(args, child, &self.config)?;
            let filter = match list.filters() {
                Some(filter) => Some(filter.to_sql(&mut cx.resolver(child), dialect)?),
                None => None,
            };

            let mut counts: IndexMap<String, i64> = ids.iter().map(|id| (id.clone(), 0)).collect();
            if ids.is_empty() {
                return Ok(counts);
            }
            let branches = ids.iter().enumerate().map(|(i, id)| {
                let mut query = SelectQuery::from_table(child.name())
                    .column(SQL::number(i).alias(INDEX))
                    .column(SQL::func("COUNT", fk.clone()).alias("count"))
                    .filter(eq(fk.clone(), Value::from(id.as_str()).coerce(owner.class())));
                if let Some(filter) = &filter {
                    query.and_filter(filter.clone());
                }
                query.to_sql(dialect)
            });
            let sql = union_all(branches.collect::<Vec<_>>(), dialect);

            for row in conn.query(&sql).await? {
                let index = row.get(INDEX).and_then(Value::as_i64);
                let count = row.get("count").and_then(Value::as_i64).unwrap_or(0);
                if let Some(id) = index.and_then(|i| ids.get(i as usize)) {
                    counts.insert(id.clone(), count);
                }
            }
            Ok(counts)
        })
        .await
    }

    /// Rows of the many-to-many `related` table not linked to `parent_id`.
    pub async fn m2m_not_children(
        &self,
        related: &str,
        parent_id: &str,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Vec<Row>> {
        self.traced("m2m_not_children", async {
            let (table, scope) = self.not_linked(related, parent_id)?;
            let list = ListArgs::parse(args, table, &self.config)?;
            self.cx(self.conn(tx)).list(table, &list, Some(scope)).await
        })
        .await
    }

    pub async fn m2m_not_children_count(
        &self,
        related: &str,
        parent_id: &str,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<i64> {
        self.traced("m2m_not_children_count", async {
            let (table, scope) = self.not_linked(related, parent_id)?;
            let list = ListArgs::parse(args, table, &self.config)?;
            self.sibling(table.name())?
                .count_where(self.conn(tx), &list, Some(scope))
                .await
        })
        .await
    }

    /// Related table of a many-to-many relation and the condition excluding
    /// rows already linked to `parent_id`.
    fn not_linked(&self, related: &str, parent_id: &str) -> Result<(&Table, SQL)> {
        let relation = self.require_relation(RelationKind::ManyToMany, related)?;
        let junction = relation.junction.as_ref().ok_or_else(|| {
            BaseModelError::Schema(format!("{} relation has no junction table", relation.related))
        })?;
        let table: &Table = self.snapshot.require(&relation.related)?;
        let owner = self.table.require_column(&relation.column)?;

        let linked = SQL::qualified(junction.table.as_str(), junction.related_column.as_str());
        let subquery = SelectQuery::from_table(junction.table.as_str())
            .column(linked.clone())
            .filter(eq(
                SQL::qualified(junction.table.as_str(), junction.column.as_str()),
                Value::from(parent_id).coerce(owner.class()),
            ))
            .filter(linked.push(Token::IS_NOT_NULL));
        let scope = SQL::qualified(table.name(), relation.related_column.as_str())
            .push(Token::NOT_IN)
            .append(subquery.to_sql(self.dialect()).parens());
        Ok((table, scope))
    }

    pub(super) fn require_relation(&self, kind: RelationKind, name: &str) -> Result<&TableRelation> {
        self.table.relation(kind, name).ok_or_else(|| {
            BaseModelError::query(format!(
                "{name} : {} relation not found in {}",
                kind.list_arg(),
                self.table.alias()
            ))
        })
    }

    /// Relation by nested property (`ItemsList`) or related table name.
    pub(crate) fn find_relation(&self, name: &str) -> Result<&TableRelation> {
        self.table
            .relation_by_property(name)
            .or_else(|| KINDS.iter().find_map(|kind| self.table.relation(*kind, name)))
            .ok_or_else(|| {
                BaseModelError::query(format!(
                    "{name} : relation not found in {}",
                    self.table.alias()
                ))
            })
    }
}

// ============================================================================
// Links
// ============================================================================

impl BaseModel {
    /// Links row `id` to row `child_id` of the relation `name`.
    pub async fn link(
        &self,
        name: &str,
        id: &str,
        child_id: &str,
        tx: Option<&dyn Connection>,
    ) -> Result<()> {
        self.traced("link", async {
            let scope = self.scope(tx).await?;
            let result = self.relink(name, id, child_id, true, scope.conn()).await;
            scope.finish(result).await
        })
        .await
    }

    /// Removes the link between row `id` and row `child_id`.
    pub async fn unlink(
        &self,
        name: &str,
        id: &str,
        child_id: &str,
        tx: Option<&dyn Connection>,
    ) -> Result<()> {
        self.traced("unlink", async {
            let scope = self.scope(tx).await?;
            let result = self.relink(name, id, child_id, false, scope.conn()).await;
            scope.finish(result).await
        })
        .await
    }

    pub(super) async fn relink(
        &self,
        name: &str,
        id: &str,
        child_id: &str,
        link: bool,
        conn: &dyn Connection,
    ) -> Result<()> {
        let relation = self.find_relation(name)?;
        let related: &Table = self.snapshot.require(&relation.related)?;
        let dialect = conn.dialect();

        let sql = match relation.kind {
            RelationKind::ManyToMany => {
                let junction = relation.junction.as_ref().ok_or_else(|| {
                    BaseModelError::Schema(format!(
                        "{} relation has no junction table",
                        relation.related
                    ))
                })?;
                let owner = column_value(conn, &self.table, id, &relation.column).await?;
                let target = column_value(conn, related, child_id, &relation.related_column).await?;
                if link {
                    let mut row = Row::new();
                    row.insert(junction.column.clone(), owner);
                    row.insert(junction.related_column.clone(), target);
                    InsertQuery::into_table(junction.table.as_str())
                        .row(&row)?
                        .to_sql(dialect)?
                } else {
                    let table = junction.table.as_str();
                    DeleteQuery::from_table(table)
                        .filter(and([
                            eq(SQL::qualified(table, junction.column.as_str()), owner),
                            eq(SQL::qualified(table, junction.related_column.as_str()), target),
                        ]))
                        .to_sql()
                }
            }
            RelationKind::HasMany => {
                let owner = column_value(conn, &self.table, id, &relation.column).await?;
                let child_pk = pk_filter(related, Some(related.name()), child_id)?;
                let fk = SQL::qualified(related.name(), relation.related_column.as_str());
                let query = UpdateQuery::table(related.name());
                if link {
                    query
                        .set(relation.related_column.as_str(), owner)
                        .filter(child_pk)
                        .to_sql(dialect)?
                } else {
                    query
                        .set(relation.related_column.as_str(), Value::Null)
                        .filter(and([child_pk, eq(fk, owner)]))
                        .to_sql(dialect)?
                }
            }
            RelationKind::BelongsTo => {
                let value = if link {
                    column_value(conn, related, child_id, &relation.related_column).await?
                } else {
                    Value::Null
                };
                UpdateQuery::table(self.table.name())
                    .set(relation.column.as_str(), value)
                    .filter(pk_filter(&self.table, Some(self.table.name()), id)?)
                    .to_sql(dialect)?
            }
        };
        let outcome = conn.execute(&sql).await?;
        tracing::debug!(
            table = self.table.name(),
            relation = relation.property.as_str(),
            link,
            rows = outcome.rows_affected,
            "basemodel.relink"
        );
        Ok(())
    }
}

/// Physical `column` of the row of `table` keyed `id`.
async fn column_value(
    conn: &dyn Connection,
    table: &Table,
    id: &str,
    column: &str,
) -> Result<Value> {
    let query = SelectQuery::from_table(table.name())
        .column(SQL::qualified(table.name(), column).alias("__value"))
        .filter(pk_filter(table, Some(table.name()), id)?)
        .limit(1);
    let mut row = conn
        .query_one(&query.to_sql(conn.dialect()))
        .await?
        .ok_or(BaseModelError::NotFound)?;
    Ok(row.shift_remove("__value").unwrap_or_default())
}
