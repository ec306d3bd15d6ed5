//! Batched record import.
//!
//! A [`WriteSink`] lets an import pipeline load rows without knowing primary
//! keys: records name their parents and linked rows by a natural key
//! (`Customers.email = "a@b.co"`), the sink resolves those keys, inserts the
//! records in bulk and creates the links, all in one transaction per batch.

use crate::diagnostic::{self, Diagnostic};
use crate::model::{BaseModel, ModelContext};
use crate::pk::extract_pk_values;
use crate::schema::{RelationKind, Table};
use basemodel_core::helpers::eq;
use basemodel_core::{Connection, Result, Row, SQL, SelectQuery, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Reference from a record to a row of a related table.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Relation property (`CustomersRead`) or related table name
    pub relation: String,
    /// Column of the related table identifying the target row
    pub key_column: String,
    pub key: Value,
}

impl Link {
    pub fn new(relation: impl Into<String>, key_column: impl Into<String>, key: impl Into<Value>) -> Self {
        Self {
            relation: relation.into(),
            key_column: key_column.into(),
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// Column values keyed by alias
    pub values: Row,
    /// Belongs-to links set the foreign key before the insert; has-many and
    /// many-to-many links are created afterwards and need the record's own
    /// primary key in `values`.
    pub links: Vec<Link>,
}

impl Record {
    pub fn new(values: Row) -> Self {
        Self {
            values,
            links: Vec::new(),
        }
    }

    pub fn link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    pub table: String,
    pub records: Vec<Record>,
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkReport {
    pub table: String,
    pub inserted: u64,
    pub linked: u64,
    /// Links that could not be resolved (lenient mode only)
    pub unresolved: Vec<Diagnostic>,
}

/// Relation, link key and key value; the cache key of a resolved target.
type TargetKey = (String, String, String);

pub struct WriteSink {
    context: Arc<ModelContext>,
}

impl WriteSink {
    pub fn new(context: Arc<ModelContext>) -> Self {
        Self { context }
    }

    /// Writes `batch` atomically: either every record and link is stored or
    /// nothing is.
    pub async fn write(&self, batch: RecordBatch) -> Result<SinkReport> {
        let model = self.context.model(&batch.table)?;
        let scope = model.scope(None).await?;
        let result = write_batch(&model, batch, scope.conn()).await;
        let report = scope.finish(result).await?;
        tracing::info!(
            table = %report.table,
            inserted = report.inserted,
            linked = report.linked,
            unresolved = report.unresolved.len(),
            "basemodel.sink.batch"
        );
        Ok(report)
    }
}

async fn write_batch(model: &BaseModel, batch: RecordBatch, conn: &dyn Connection) -> Result<SinkReport> {
    let table = model.table();
    let mode = model.config().resolution;
    let mut report = SinkReport {
        table: table.name().to_string(),
        ..Default::default()
    };
    let mut targets: HashMap<TargetKey, Option<Row>> = HashMap::new();
    let mut rows = Vec::with_capacity(batch.records.len());
    let mut later: Vec<(String, String, String)> = Vec::new();

    for record in batch.records {
        let mut values = record.values;
        for link in &record.links {
            let Ok(relation) = model.find_relation(&link.relation) else {
                let diag = Diagnostic::new(table.name(), link.relation.as_str(), "relation not found");
                diagnostic::skip(mode, diag, &mut report.unresolved)?;
                continue;
            };
            let Some(related) = model.snapshot().table(&relation.related) else {
                let diag = Diagnostic::new(table.name(), relation.property.as_str(), "table not registered");
                diagnostic::skip(mode, diag, &mut report.unresolved)?;
                continue;
            };
            let key = (
                relation.property.clone(),
                link.key_column.clone(),
                link.key.key_string().unwrap_or_default(),
            );
            if !targets.contains_key(&key) {
                let target = find_target(conn, related, &link.key_column, &link.key).await?;
                targets.insert(key.clone(), target);
            }
            let Some(target) = targets.get(&key).and_then(Option::as_ref) else {
                let diag = Diagnostic::new(
                    table.name(),
                    relation.property.as_str(),
                    format!("no {} row with {} = {}", related.alias(), link.key_column, link.key),
                );
                diagnostic::skip(mode, diag, &mut report.unresolved)?;
                continue;
            };

            match relation.kind {
                RelationKind::BelongsTo => {
                    let fk = table.require_column(&relation.column)?;
                    let value = target.get(&relation.related_column).cloned().unwrap_or_default();
                    values.shift_remove(&fk.name);
                    values.insert(fk.alias.clone(), value);
                    report.linked += 1;
                }
                RelationKind::HasMany | RelationKind::ManyToMany => {
                    let ids = extract_pk_values(table, &values).zip(extract_pk_values(related, target));
                    let Some((id, child)) = ids else {
                        let diag = Diagnostic::new(
                            table.name(),
                            relation.property.as_str(),
                            "record or target has no primary key",
                        );
                        diagnostic::skip(mode, diag, &mut report.unresolved)?;
                        continue;
                    };
                    later.push((relation.property.clone(), id, child));
                }
            }
        }
        rows.push(values);
    }

    for chunk in rows.chunks(model.config().bulk_length_max.max(1)) {
        report.inserted += model.insert_bulk(chunk, Some(conn)).await?;
    }
    for (property, id, child) in later {
        model.link(&property, &id, &child, Some(conn)).await?;
        report.linked += 1;
    }
    Ok(report)
}

/// Physical row of `table` whose `column` equals `key`.
async fn find_target(
    conn: &dyn Connection,
    table: &Table,
    column: &str,
    key: &Value,
) -> Result<Option<Row>> {
    let column = table.require_column(column)?;
    let query = SelectQuery::from_table(table.name())
        .columns(
            table
                .columns()
                .iter()
                .map(|c| SQL::qualified(table.name(), c.name.as_str())),
        )
        .filter(eq(
            SQL::qualified(table.name(), column.name.as_str()),
            key.clone(),
        ))
        .limit(1);
    conn.query_one(&query.to_sql(conn.dialect())).await
}
