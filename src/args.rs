//! Request argument normalization.
//!
//! Arguments arrive as a loose JSON map (`fields`/`f`, `where`/`w`,
//! `limit`/`l`, per-relation `hfields1`, ...). Absent, `null`, empty, zero
//! and `false` values all count as not given, matching how the API layer
//! sends them.

use crate::config::QueryConfig;
use crate::schema::{RelationKind, Table};
use basemodel_core::{FilterExpr, OrderBy, Result, parse_condition, parse_where};
use indexmap::IndexMap;
use serde_json::Value as Json;

// ============================================================================
// QueryArgs
// ============================================================================

/// Raw request arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryArgs(IndexMap<String, Json>);

impl QueryArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments from a JSON object; anything else yields no arguments.
    pub fn from_json(json: Json) -> Self {
        match json {
            Json::Object(map) => Self(map.into_iter().collect()),
            _ => Self::default(),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Json>) {
        self.0.insert(key.into(), value.into());
    }

    /// Whether `key` was sent at all, even empty.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Value of `key` when it is truthy.
    pub fn get(&self, key: &str) -> Option<&Json> {
        self.0.get(key).filter(|v| truthy(v))
    }

    /// First truthy value among `keys`.
    pub fn first(&self, keys: &[&str]) -> Option<&Json> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// Text form of the first truthy value among `keys`; arrays are joined
    /// with commas.
    pub fn text(&self, keys: &[&str]) -> Option<String> {
        self.first(keys).and_then(json_text)
    }

    /// Text form of `key`, including falsy values such as `0`.
    pub fn raw_text(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(json_text)
    }

    pub fn number(&self, keys: &[&str]) -> Option<i64> {
        self.first(keys).and_then(json_number)
    }

    /// `self` layered over `defaults`; keys present in `self` win even when
    /// empty, so `{"bt": ""}` switches off default belongs-to expansion.
    pub fn over(&self, defaults: &QueryArgs) -> QueryArgs {
        let mut merged = defaults.0.clone();
        for (key, value) in &self.0 {
            merged.insert(key.clone(), value.clone());
        }
        QueryArgs(merged)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Json)> {
        self.0.iter()
    }
}

impl From<Json> for QueryArgs {
    fn from(value: Json) -> Self {
        Self::from_json(value)
    }
}

fn truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Json::String(s) => !s.is_empty(),
        Json::Array(_) | Json::Object(_) => true,
    }
}

fn json_text(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        Json::Array(items) => Some(
            items
                .iter()
                .filter_map(json_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Json::Null | Json::Object(_) => None,
    }
}

fn json_number(value: &Json) -> Option<i64> {
    match value {
        Json::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Json::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// Splits a comma separated list, dropping blanks and repeats.
pub(crate) fn split_list(text: &str, separators: &[char]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in text.split(separators).map(str::trim) {
        if !item.is_empty() && !out.iter().any(|o| o == item) {
            out.push(item.to_string());
        }
    }
    out
}

/// Relation names listed under `hm`, `bt` or `mm`. Belongs-to lists also
/// accept `~` as separator.
pub fn relation_names(args: &QueryArgs, kind: RelationKind) -> Vec<String> {
    let Some(text) = args.text(&[kind.list_arg()]) else {
        return Vec::new();
    };
    match kind {
        RelationKind::BelongsTo => split_list(&text, &[',', '~']),
        _ => split_list(&text, &[',']),
    }
}

// ============================================================================
// Fields and sort
// ============================================================================

/// Requested projection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Fields {
    #[default]
    All,
    List(Vec<String>),
}

impl Fields {
    /// `*`, `<table>.*` and the empty list select everything.
    pub fn parse(text: &str, table: &Table) -> Self {
        let star = format!("{}.*", table.name());
        let names = split_list(text, &[',']);
        if names.is_empty() || names.iter().any(|n| n == "*" || *n == star) {
            return Fields::All;
        }
        let prefix = format!("{}.", table.name());
        Fields::List(
            names
                .into_iter()
                .map(|n| n.strip_prefix(&prefix).map(str::to_string).unwrap_or(n))
                .collect(),
        )
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Fields::All)
    }

    /// Whether `name` is selected; everything is selected by [`Fields::All`].
    pub fn includes(&self, name: &str) -> bool {
        match self {
            Fields::All => true,
            Fields::List(names) => names.iter().any(|n| n == name),
        }
    }

    /// Adds `name` to an explicit list unless the column is already there
    /// under its alias or physical name.
    pub fn ensure(&mut self, table: &Table, name: &str) {
        let Fields::List(names) = self else {
            return;
        };
        let present = names.iter().any(|n| {
            n == name
                || table
                    .column(n)
                    .zip(table.column(name))
                    .is_some_and(|(a, b)| a.name == b.name)
        });
        if !present {
            names.push(name.to_string());
        }
    }
}

/// Requested ordering.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Sort {
    /// No explicit order; dialect rules decide
    #[default]
    Default,
    Explicit(Vec<(String, OrderBy)>),
}

impl Sort {
    /// `-a,b` sorts by `a` descending, then `b` ascending.
    pub fn parse(text: &str) -> Self {
        let keys: Vec<_> = split_list(text, &[','])
            .into_iter()
            .map(|key| match key.strip_prefix('-') {
                Some(name) => (name.to_string(), OrderBy::Desc),
                None => (key, OrderBy::Asc),
            })
            .filter(|(name, _)| !name.is_empty())
            .collect();
        if keys.is_empty() {
            Sort::Default
        } else {
            Sort::Explicit(keys)
        }
    }
}

// ============================================================================
// ListArgs
// ============================================================================

/// Normalized arguments of one list-style query.
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub fields: Fields,
    pub filter: Option<FilterExpr>,
    pub having: Option<FilterExpr>,
    pub condition: Option<FilterExpr>,
    pub condition_graph: Option<FilterExpr>,
    pub limit: usize,
    pub offset: usize,
    pub sort: Sort,
}

impl ListArgs {
    /// Top-level arguments. Filter grammar errors propagate unchanged.
    pub fn parse(args: &QueryArgs, table: &Table, config: &QueryConfig) -> Result<Self> {
        Ok(Self {
            fields: Fields::parse(&args.text(&["fields", "f"]).unwrap_or_default(), table),
            filter: parse_text(args, &["where", "w"])?,
            having: parse_text(args, &["having", "h"])?,
            condition: parse_object(args, &["condition", "c"])?,
            condition_graph: parse_object(args, &["conditionGraph"])?,
            limit: clamp(args.number(&["limit", "l"]), config),
            offset: offset(args.number(&["offset", "o"])),
            sort: Sort::parse(&args.text(&["sort", "s"]).unwrap_or_default()),
        })
    }

    /// Arguments of the `index`th (zero based) relation of `kind`, read
    /// from the suffixed keys (`hwhere1`, `w1`, `blimit2`, ...). The related
    /// table's primary key and primary value are always selected; without
    /// explicit fields nothing else is.
    pub fn child(
        args: &QueryArgs,
        kind: RelationKind,
        index: usize,
        child: &Table,
        config: &QueryConfig,
    ) -> Result<Self> {
        let p = kind.arg_prefix();
        let i = index + 1;
        let key = |name: &str| format!("{p}{name}{i}");
        let short = |name: &str| format!("{name}{i}");

        let mut fields = match args.text(&[&key("fields"), &short("f")]) {
            Some(text) => Fields::parse(&text, child),
            None => Fields::List(Vec::new()),
        };
        let keys: Vec<String> = child
            .primary_keys()
            .chain(child.primary_value())
            .map(|c| c.name.clone())
            .collect();
        if matches!(&fields, Fields::List(list) if list.is_empty()) && keys.is_empty() {
            fields = Fields::All;
        }
        for name in &keys {
            fields.ensure(child, name);
        }

        Ok(Self {
            fields,
            filter: parse_text(args, &[&key("where"), &short("w")])?,
            having: None,
            condition: None,
            condition_graph: None,
            limit: clamp(args.number(&[&key("limit"), &format!("{p}l{i}")]), config),
            offset: offset(args.number(&[&key("offset"), &format!("{p}o{i}")])),
            sort: Sort::parse(
                &args
                    .text(&[&key("sort"), &format!("{p}s{i}")])
                    .unwrap_or_default(),
            ),
        })
    }

    /// `where`, `condition` and `conditionGraph` combined.
    pub fn filters(&self) -> Option<FilterExpr> {
        let combined = FilterExpr::and_opt(self.filter.clone(), self.condition.clone());
        FilterExpr::and_opt(combined, self.condition_graph.clone())
    }
}

fn parse_text(args: &QueryArgs, keys: &[&str]) -> Result<Option<FilterExpr>> {
    match args.text(keys) {
        Some(text) => parse_where(&text),
        None => Ok(None),
    }
}

fn parse_object(args: &QueryArgs, keys: &[&str]) -> Result<Option<FilterExpr>> {
    match args.first(keys) {
        Some(json) => parse_condition(json),
        None => Ok(None),
    }
}

fn clamp(requested: Option<i64>, config: &QueryConfig) -> usize {
    config.clamp_limit(requested.map(|n| n.max(0) as usize))
}

fn offset(requested: Option<i64>) -> usize {
    requested.unwrap_or(0).max(0) as usize
}

// ============================================================================
// Default nested arguments
// ============================================================================

/// Relations expanded when the caller does not say otherwise: every
/// relation of the table, and for single-hop lookups the looked-up column
/// in the matching `{h,b,m}fields<i>`.
pub fn default_nested(table: &Table) -> QueryArgs {
    let mut args = QueryArgs::new();
    let mut lists: Vec<(RelationKind, Vec<String>)> = Vec::new();
    for kind in [
        RelationKind::HasMany,
        RelationKind::BelongsTo,
        RelationKind::ManyToMany,
    ] {
        let names: Vec<String> = table
            .relations_of(kind)
            .map(|r| r.related.clone())
            .collect();
        args.insert(kind.list_arg(), names.join(","));
        lists.push((kind, names));
    }

    let mut fields: IndexMap<String, Vec<String>> = IndexMap::new();
    for lookup in table.lookups() {
        let [hop] = lookup.hops.as_slice() else {
            continue;
        };
        let Some((_, names)) = lists.iter().find(|(kind, _)| *kind == hop.kind) else {
            continue;
        };
        if let Some(position) = names.iter().position(|n| *n == hop.related) {
            let key = format!("{}fields{}", hop.kind.arg_prefix(), position + 1);
            fields.entry(key).or_default().push(lookup.column.clone());
        }
    }
    for (key, columns) in fields {
        args.insert(key, columns.join(","));
    }
    args
}

/// The belongs-to part of [`default_nested`]; write operations return rows
/// expanded this far.
pub fn default_nested_bt(table: &Table) -> QueryArgs {
    let all = default_nested(table);
    let mut args = QueryArgs::new();
    for (key, value) in all.iter() {
        if key == "bt" || key.starts_with("bf") {
            args.insert(key.clone(), value.clone());
        }
    }
    args.insert("hm", "");
    args.insert("mm", "");
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolutionMode;
    use crate::schema::{
        Column, Relation, RelationRef, SchemaSnapshot, TableMeta, VirtualColumn,
    };
    use basemodel_types::ColumnType;
    use serde_json::json;

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot::build(
            1,
            vec![
                TableMeta::new("orders")
                    .column(Column::id("id"))
                    .column(Column::new("title", ColumnType::SingleLineText).alias("Title").primary_value())
                    .column(Column::new("customer_id", ColumnType::ForeignKey))
                    .relation(Relation::has_many("items", "id", "order_id"))
                    .relation(Relation::belongs_to("customers", "customer_id", "id"))
                    .virtual_column(VirtualColumn::Lookup {
                        alias: "CustomerName".into(),
                        relation: RelationRef::new(RelationKind::BelongsTo, "customers"),
                        column: "name".into(),
                    }),
                TableMeta::new("items")
                    .column(Column::id("id"))
                    .column(Column::new("order_id", ColumnType::ForeignKey))
                    .column(Column::new("qty", ColumnType::Number)),
                TableMeta::new("customers")
                    .column(Column::id("id"))
                    .column(Column::new("name", ColumnType::SingleLineText)),
            ],
            ResolutionMode::Strict,
        )
        .unwrap()
    }

    #[test]
    fn limits_are_clamped() {
        let snapshot = snapshot();
        let orders = snapshot.require("orders").unwrap();
        let config = QueryConfig::default();
        for (requested, expected) in [
            (json!(null), 25),
            (json!(5000), 100),
            (json!(-4), 1),
            (json!("7"), 7),
            (json!(0), 25),
        ] {
            let args = QueryArgs::new().with("limit", requested.clone());
            let parsed = ListArgs::parse(&args, orders, &config).unwrap();
            assert_eq!(parsed.limit, expected, "limit {requested}");
        }
        let args = QueryArgs::new().with("l", 3).with("o", -10);
        let parsed = ListArgs::parse(&args, orders, &config).unwrap();
        assert_eq!((parsed.limit, parsed.offset), (3, 0));
    }

    #[test]
    fn parses_fields_and_sort() {
        let snapshot = snapshot();
        let orders = snapshot.require("orders").unwrap();
        let args = QueryArgs::from_json(json!({
            "f": "orders.Title,id",
            "s": "-Title,id",
            "w": "(Title,like,%a%)",
        }));
        let parsed = ListArgs::parse(&args, orders, &QueryConfig::default()).unwrap();
        assert_eq!(parsed.fields, Fields::List(vec!["Title".into(), "id".into()]));
        assert_eq!(
            parsed.sort,
            Sort::Explicit(vec![("Title".into(), OrderBy::Desc), ("id".into(), OrderBy::Asc)])
        );
        assert!(parsed.filter.is_some());

        let star = QueryArgs::new().with("fields", "*");
        assert!(ListArgs::parse(&star, orders, &QueryConfig::default()).unwrap().fields.is_all());
    }

    #[test]
    fn malformed_filters_propagate() {
        let snapshot = snapshot();
        let orders = snapshot.require("orders").unwrap();
        let args = QueryArgs::new().with("where", "(Title,eq");
        assert!(ListArgs::parse(&args, orders, &QueryConfig::default()).is_err());
    }

    #[test]
    fn child_args_always_carry_keys() {
        let snapshot = snapshot();
        let orders = snapshot.require("orders").unwrap();
        let config = QueryConfig::default();
        let args = QueryArgs::from_json(json!({"hfields1": "qty", "hl1": 1, "w1": "(qty,gt,1)"}));
        let items = snapshot.require("items").unwrap();
        let child = ListArgs::child(&args, RelationKind::HasMany, 0, items, &config).unwrap();
        assert_eq!(child.fields, Fields::List(vec!["qty".into(), "id".into()]));
        assert_eq!(child.limit, 1);
        assert!(child.filter.is_some());

        // no explicit fields: key and primary value only
        let child = ListArgs::child(&QueryArgs::new(), RelationKind::BelongsTo, 0, orders, &config)
            .unwrap();
        assert_eq!(child.fields, Fields::List(vec!["id".into(), "title".into()]));
    }

    #[test]
    fn default_nested_params() {
        let snapshot = snapshot();
        let orders = snapshot.require("orders").unwrap();
        let defaults = default_nested(orders);
        assert_eq!(defaults.get("hm"), Some(&json!("items")));
        assert_eq!(defaults.get("bt"), Some(&json!("customers")));
        assert_eq!(defaults.get("bfields1"), Some(&json!("name")));

        let bt = default_nested_bt(orders);
        assert!(bt.get("hm").is_none());
        assert_eq!(bt.get("bfields1"), Some(&json!("name")));

        let merged = QueryArgs::new().with("bt", "").over(&defaults);
        assert!(relation_names(&merged, RelationKind::BelongsTo).is_empty());
        assert_eq!(relation_names(&merged, RelationKind::HasMany), ["items"]);
    }

    #[test]
    fn belongs_to_lists_accept_tilde() {
        let args = QueryArgs::new().with("bt", "a~b,a");
        assert_eq!(relation_names(&args, RelationKind::BelongsTo), ["a", "b"]);
    }
}
