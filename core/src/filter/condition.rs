//! Parser for structured condition objects.
//!
//! ```json
//! {
//!   "_or": [{ "title": { "like": "%a%" } }, { "qty": { "gt": 5 } }],
//!   "_not": { "status": { "eq": "archived" } },
//!   "Orders": { "relationType": "hm", "amount": { "ge": 100 } }
//! }
//! ```
//!
//! Sibling keys are AND-ed. A nested object carrying `relationType` (`hm` or
//! `bt`) moves the enclosed conditions onto the named related table.

use super::{
    ColumnRef, CompareOp, Comparison, FilterExpr, HopKind, MAX_DEPTH, Operand, RelationHop,
};
use crate::error::{BaseModelError, Result};
use crate::value::Value;
use serde_json::{Map, Value as Json};

const RELATION_TYPE: &str = "relationType";

/// Parses a condition object. `null` and empty objects yield `None`.
pub fn parse_condition(input: &Json) -> Result<Option<FilterExpr>> {
    match input {
        Json::Null => Ok(None),
        Json::Object(map) => {
            let items = parse_object(map, &[], None, 0)?;
            Ok(conjunction(items))
        }
        other => Err(BaseModelError::query(format!(
            "{other} : condition must be an object"
        ))),
    }
}

fn parse_object(
    map: &Map<String, Json>,
    path: &[RelationHop],
    column: Option<&str>,
    depth: usize,
) -> Result<Vec<FilterExpr>> {
    if depth > MAX_DEPTH {
        return Err(BaseModelError::query("condition nested too deeply"));
    }
    let mut items = Vec::new();
    for (key, value) in map {
        match key.as_str() {
            "_or" | "_and" => {
                let branches = value.as_array().ok_or_else(|| {
                    BaseModelError::query(format!("{key} : expects an array of conditions"))
                })?;
                let mut parts = Vec::with_capacity(branches.len());
                for branch in branches {
                    let Some(inner) = branch.as_object() else {
                        return Err(BaseModelError::query(format!(
                            "{branch} : condition must be an object"
                        )));
                    };
                    if let Some(expr) = conjunction(parse_object(inner, path, None, depth + 1)?) {
                        parts.push(expr);
                    }
                }
                if !parts.is_empty() {
                    items.push(if key == "_or" {
                        FilterExpr::Or(parts)
                    } else {
                        FilterExpr::And(parts)
                    });
                }
            }
            "_not" => {
                let inner = value.as_object().ok_or_else(|| {
                    BaseModelError::query("_not : expects a condition object")
                })?;
                if let Some(expr) = conjunction(parse_object(inner, path, None, depth + 1)?) {
                    items.push(FilterExpr::Not(Box::new(expr)));
                }
            }
            RELATION_TYPE => {}
            _ => match value {
                Json::Object(inner) if inner.contains_key(RELATION_TYPE) => {
                    let kind = match inner.get(RELATION_TYPE).and_then(Json::as_str) {
                        Some("hm") => HopKind::HasMany,
                        Some("bt") => HopKind::BelongsTo,
                        other => {
                            return Err(BaseModelError::query(format!(
                                "{} : unsupported relationType",
                                other.unwrap_or("null")
                            )));
                        }
                    };
                    let mut nested = path.to_vec();
                    nested.push(RelationHop {
                        table: key.clone(),
                        kind,
                    });
                    items.extend(parse_object(inner, &nested, None, depth + 1)?);
                }
                Json::Object(inner) => {
                    items.extend(parse_object(inner, path, Some(key), depth + 1)?)
                }
                _ => items.push(parse_operator(key, value, path, column)?),
            },
        }
    }
    Ok(items)
}

fn parse_operator(
    key: &str,
    value: &Json,
    path: &[RelationHop],
    column: Option<&str>,
) -> Result<FilterExpr> {
    let Some(column) = column else {
        return Err(BaseModelError::query(format!(
            "{key} : expected an operator object for this column"
        )));
    };
    let (op, operand) = match key {
        "eq" => (CompareOp::Eq, Operand::Value(Value::from_json(value.clone()))),
        "neq" => (CompareOp::Ne, Operand::Value(Value::from_json(value.clone()))),
        "like" => (CompareOp::Like, Operand::Value(Value::from_json(value.clone()))),
        "nlike" => (
            CompareOp::NotLike,
            Operand::Value(Value::from_json(value.clone())),
        ),
        "gt" => (CompareOp::Gt, Operand::Value(Value::from_json(value.clone()))),
        "ge" => (CompareOp::Ge, Operand::Value(Value::from_json(value.clone()))),
        "lt" => (CompareOp::Lt, Operand::Value(Value::from_json(value.clone()))),
        "le" => (CompareOp::Le, Operand::Value(Value::from_json(value.clone()))),
        "in" => (CompareOp::In, Operand::List(list(value))),
        "nin" => (CompareOp::NotIn, Operand::List(list(value))),
        other => {
            return Err(BaseModelError::query(format!(
                "Found invalid conditional operator \"{other}\" in expression"
            )));
        }
    };
    Ok(FilterExpr::Comparison(Comparison {
        column: ColumnRef {
            path: path.to_vec(),
            name: column.to_string(),
        },
        op,
        operand,
    }))
}

fn list(value: &Json) -> Vec<Value> {
    match value {
        Json::Array(items) => items.iter().cloned().map(Value::from_json).collect(),
        Json::Null => Vec::new(),
        single => vec![Value::from_json(single.clone())],
    }
}

fn conjunction(mut items: Vec<FilterExpr>) -> Option<FilterExpr> {
    match items.len() {
        0 => None,
        1 => items.pop(),
        _ => Some(FilterExpr::And(items)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_nesting_is_rejected() {
        let mut condition = json!({ "title": { "eq": "a" } });
        for _ in 0..1000 {
            condition = json!({ "_not": condition });
        }
        let err = parse_condition(&condition).unwrap_err();
        assert_eq!(err.to_string(), "condition nested too deeply");
    }

    #[test]
    fn column_operators_are_anded() {
        let expr = parse_condition(&json!({
            "title": { "like": "%a%" },
            "qty": { "gt": 5, "le": 10 }
        }))
        .unwrap()
        .unwrap();
        let FilterExpr::And(items) = expr else {
            panic!("expected And");
        };
        assert_eq!(items.len(), 3);
        let FilterExpr::Comparison(cmp) = &items[1] else {
            panic!("expected comparison");
        };
        assert_eq!(cmp.column.name, "qty");
        assert_eq!(cmp.op, CompareOp::Gt);
        assert_eq!(cmp.operand, Operand::Value(Value::Integer(5)));
    }

    #[test]
    fn logical_keys() {
        let expr = parse_condition(&json!({
            "_or": [{ "a": { "eq": 1 } }, { "b": { "eq": 2 } }],
            "_not": { "c": { "in": [1, 2] } }
        }))
        .unwrap()
        .unwrap();
        let FilterExpr::And(items) = expr else {
            panic!("expected And");
        };
        assert!(matches!(&items[0], FilterExpr::Or(parts) if parts.len() == 2));
        assert!(matches!(&items[1], FilterExpr::Not(_)));
    }

    #[test]
    fn relation_nodes_extend_the_path() {
        let expr = parse_condition(&json!({
            "Orders": {
                "relationType": "hm",
                "Customers": { "relationType": "bt", "name": { "eq": "ann" } }
            }
        }))
        .unwrap()
        .unwrap();
        let FilterExpr::Comparison(cmp) = expr else {
            panic!("expected comparison");
        };
        assert_eq!(cmp.column.name, "name");
        assert_eq!(
            cmp.column.path,
            vec![
                RelationHop {
                    table: "Orders".into(),
                    kind: HopKind::HasMany
                },
                RelationHop {
                    table: "Customers".into(),
                    kind: HopKind::BelongsTo
                },
            ]
        );
    }

    #[test]
    fn invalid_operator_is_reported() {
        let err = parse_condition(&json!({ "a": { "between": [1, 2] } })).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Found invalid conditional operator \"between\" in expression"
        );
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(parse_condition(&Json::Null).unwrap(), None);
        assert_eq!(parse_condition(&json!({})).unwrap(), None);
    }
}
