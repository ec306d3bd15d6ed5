//! Lookup attachment.
//!
//! Lookups are filled in after the rows are fetched: each hop of a
//! [`LookupPlan`] is one `IN (...)` query over the keys collected from every
//! row, so a page of rows costs one statement per hop whatever its size.

use crate::model::Ctx;
use crate::schema::{LookupPlan, Relation};
use basemodel_core::helpers::in_list;
use basemodel_core::{Result, Row, SQL, SelectQuery, Token, Value};
use std::collections::HashMap;

const KEY: &str = "__key";
const VALUE: &str = "__value";

/// Sets every lookup of `lookups` on `rows`; `key` names the row entry
/// holding the first hop's join value. Lookups through belongs-to hops only
/// yield a scalar, the others a list.
pub(crate) async fn attach(
    cx: &Ctx<'_>,
    rows: &mut [Row],
    lookups: &[(&LookupPlan, String)],
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    for (plan, key) in lookups {
        let mut reached: Vec<Vec<Value>> = rows
            .iter()
            .map(|row| {
                row.get(key)
                    .filter(|v| !v.is_null())
                    .cloned()
                    .into_iter()
                    .collect()
            })
            .collect();

        for (i, hop) in plan.hops.iter().enumerate() {
            let next = plan
                .hops
                .get(i + 1)
                .map_or(plan.column.as_str(), |h| h.column.as_str());
            let keys = distinct(reached.iter().flatten());
            let values = fetch_hop(cx, hop, next, keys).await?;
            reached = reached
                .into_iter()
                .map(|current| {
                    current
                        .iter()
                        .filter_map(Value::key_string)
                        .flat_map(|k| values.get(&k).cloned().unwrap_or_default())
                        .collect()
                })
                .collect();
        }

        for (row, values) in rows.iter_mut().zip(reached) {
            let value = if plan.is_scalar() {
                values.into_iter().next().unwrap_or(Value::Null)
            } else {
                Value::Array(values.into_iter().filter(|v| !v.is_null()).collect())
            };
            row.insert(plan.alias.clone(), value);
        }
    }
    Ok(())
}

fn distinct<'v>(values: impl Iterator<Item = &'v Value>) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    values
        .filter(|v| v.key_string().is_some_and(|k| seen.insert(k)))
        .cloned()
        .collect()
}

/// `next` values of the rows `hop` reaches from each of `keys`.
async fn fetch_hop(
    cx: &Ctx<'_>,
    hop: &Relation,
    next: &str,
    keys: Vec<Value>,
) -> Result<HashMap<String, Vec<Value>>> {
    let mut out: HashMap<String, Vec<Value>> = HashMap::new();
    if keys.is_empty() {
        return Ok(out);
    }
    let related = cx.snapshot.require(&hop.related)?;
    let target = SQL::qualified(related.name(), hop.related_column.as_str());

    let query = SelectQuery::from_table(related.name())
        .column(SQL::qualified(related.name(), next).alias(VALUE));
    let query = match &hop.junction {
        Some(junction) => {
            let owner = SQL::qualified(junction.table.as_str(), junction.column.as_str());
            query
                .column(owner.clone().alias(KEY))
                .inner_join(
                    junction.table.as_str(),
                    None,
                    SQL::qualified(junction.table.as_str(), junction.related_column.as_str())
                        .push(Token::EQ)
                        .append(target),
                )
                .filter(in_list(owner, keys))
        }
        None => query
            .column(target.clone().alias(KEY))
            .filter(in_list(target, keys)),
    };
    let query = related.primary_keys().fold(query, |q, pk| {
        q.order_by(
            SQL::qualified(related.name(), pk.name.as_str()),
            basemodel_core::OrderBy::Asc,
        )
    });

    for mut row in cx.conn.query(&query.to_sql(cx.dialect())).await? {
        let Some(key) = row.get(KEY).and_then(Value::key_string) else {
            continue;
        };
        let value = row.shift_remove(VALUE).unwrap_or_default();
        out.entry(key).or_default().push(value);
    }
    Ok(out)
}
