//! Resumable CSV export.
//!
//! An export call walks the table page by page through
//! [`BaseModel::nested_list`] until its wall-clock budget runs out, then
//! returns the CSV text and the offset the next call continues from.

use crate::args::QueryArgs;
use crate::model::BaseModel;
use basemodel_core::{BaseModelError, Connection, Result, Row, Value};
use basemodel_types::ColumnType;
use indexmap::IndexMap;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::time::{Duration, Instant};

/// Characters `encodeURI` escapes besides non-ASCII.
const URI_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// One chunk of an export.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvExport {
    pub data: String,
    /// Offset to pass to the next call; `None` once every row was exported
    pub offset: Option<usize>,
    pub elapsed: Duration,
}

impl BaseModel {
    /// Exports rows matching `args` (including their relations) as CSV,
    /// starting at `args.offset`.
    ///
    /// `fields` limits and orders the CSV columns; names that are not
    /// columns, virtual columns or relation properties of the table are
    /// ignored. Without an explicit sort rows are exported in primary key
    /// order so consecutive calls neither repeat nor skip rows.
    pub async fn export_csv(
        &self,
        args: &QueryArgs,
        fields: Option<&[String]>,
        tx: Option<&dyn Connection>,
    ) -> Result<CsvExport> {
        self.traced("export_csv", async {
            let budget = Duration::from_millis(self.config().export_timeout_ms);
            let page_size = self.config().export_page_size.max(1);
            let start = Instant::now();

            let mut args = args.clone();
            if args.text(&["sort", "s"]).is_none() {
                let keys: Vec<&str> = self
                    .table()
                    .primary_keys()
                    .map(|c| c.alias.as_str())
                    .collect();
                if !keys.is_empty() {
                    args.insert("sort", keys.join(","));
                }
            }

            let mut offset = args.number(&["offset", "o"]).unwrap_or(0).max(0) as usize;
            let mut next = Some(offset);
            let mut records = Vec::new();
            while start.elapsed() < budget {
                let page = args
                    .clone()
                    .with("offset", offset)
                    .with("limit", page_size);
                let rows = self.nested_list(&page, tx).await?.into_inner();
                if rows.is_empty() {
                    next = None;
                    break;
                }
                offset += rows.len();
                next = Some(offset);
                records.extend(rows.iter().map(|row| self.csv_record(row)));
            }

            let elapsed = start.elapsed();
            tracing::debug!(
                table = self.table().name(),
                rows = records.len(),
                offset = ?next,
                elapsed_ms = elapsed.as_millis() as u64,
                "basemodel.export.chunk"
            );
            Ok(CsvExport {
                data: self.write_csv(&records, fields)?,
                offset: next,
                elapsed,
            })
        })
        .await
    }

    /// Flattens a nested row into CSV cells.
    fn csv_record(&self, row: &Row) -> IndexMap<String, String> {
        let table = self.table();
        let mut record = IndexMap::new();
        for column in table.columns() {
            if let Some(value) = row.get(&column.alias) {
                record.insert(column.alias.clone(), cell(value, Some(column.kind)));
            }
        }
        for lookup in table.lookups() {
            if let Some(value) = row.get(&lookup.alias) {
                record.insert(lookup.alias.clone(), cell(value, Some(lookup.kind)));
            }
        }
        for rollup in table.rollups() {
            if let Some(value) = row.get(&rollup.alias) {
                record.insert(rollup.alias.clone(), cell(value, None));
            }
        }
        for relation in table.relations() {
            let Some(value) = row.get(&relation.property) else {
                continue;
            };
            let Some(related) = self.snapshot().table(&relation.related) else {
                continue;
            };
            let Some(title) = related
                .primary_value()
                .or_else(|| related.primary_key())
            else {
                continue;
            };
            let titled = |r: &Row| r.get(&title.alias).map(|v| cell(v, Some(title.kind)));
            let text = match value {
                Value::List(rows) => rows.iter().filter_map(titled).collect::<Vec<_>>().join(","),
                Value::Object(parent) => titled(parent).unwrap_or_default(),
                _ => continue,
            };
            record.insert(relation.property.clone(), text);
        }
        record
    }

    fn write_csv(
        &self,
        records: &[IndexMap<String, String>],
        fields: Option<&[String]>,
    ) -> Result<String> {
        let table = self.table();
        let header: Vec<String> = match fields {
            Some(fields) => fields
                .iter()
                .filter(|f| {
                    table.columns().iter().any(|c| c.alias == **f)
                        || table.is_virtual(f)
                        || table.relation_by_property(f).is_some()
                })
                .cloned()
                .collect(),
            None => {
                let mut header: Vec<String> = Vec::new();
                for key in records.iter().flat_map(|r| r.keys()) {
                    if !header.contains(key) {
                        header.push(key.clone());
                    }
                }
                header
            }
        };
        if header.is_empty() {
            return Ok(String::new());
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&header).map_err(csv_error)?;
        for record in records {
            writer
                .write_record(header.iter().map(|h| {
                    record.get(h).map(String::as_str).unwrap_or_default()
                }))
                .map_err(csv_error)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| BaseModelError::Other(format!("csv: {e}")))?;
        String::from_utf8(bytes).map_err(|e| BaseModelError::Other(format!("csv: {e}")))
    }
}

fn csv_error(error: csv::Error) -> BaseModelError {
    BaseModelError::Other(format!("csv: {error}"))
}

/// Text of one cell. Attachments render as `title(url)` pairs, structured
/// values as JSON, scalar lists comma separated.
fn cell(value: &Value, kind: Option<ColumnType>) -> String {
    if kind == Some(ColumnType::Attachment) {
        return attachments(value);
    }
    match value {
        Value::Null => String::new(),
        Value::Text(text) => escape_formula(text),
        Value::Array(items) => escape_formula(
            &items
                .iter()
                .map(|v| match v {
                    Value::Text(t) => t.clone(),
                    other if other.is_structured() => other.to_json().to_string(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Json(_) | Value::List(_) | Value::Object(_) => value.to_json().to_string(),
        other => other.to_string(),
    }
}

fn attachments(value: &Value) -> String {
    let json = match value {
        Value::Text(text) => serde_json::from_str(text).unwrap_or(serde_json::Value::Null),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        other => other.to_json(),
    };
    let Some(items) = json.as_array() else {
        return String::new();
    };
    items
        .iter()
        .map(|item| {
            let field = |key: &str| item.get(key).and_then(|v| v.as_str()).unwrap_or_default();
            format!(
                "{}({})",
                utf8_percent_encode(field("title"), URI_ENCODE_SET),
                utf8_percent_encode(field("url"), URI_ENCODE_SET)
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Prefixes cells a spreadsheet would evaluate as a formula.
fn escape_formula(text: &str) -> String {
    match text.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{text}"),
        _ => text.to_string(),
    }
}
