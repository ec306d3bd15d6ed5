//! Primary key strings.
//!
//! A row is identified externally by its primary key values joined with
//! [`PK_DELIMITER`] in key column order, so composite keys travel as one
//! string.

use crate::schema::Table;
use basemodel_core::helpers;
use basemodel_core::{BaseModelError, Result, Row, SQL, Value};

pub const PK_DELIMITER: &str = "___";

/// Splits a key string into physical column and coerced value pairs.
pub fn where_pk(table: &Table, id: &str) -> Result<Row> {
    let count = table.primary_keys().len();
    if count == 0 {
        return Err(BaseModelError::Statement(format!(
            "{} has no primary key",
            table.alias()
        )));
    }
    let mut parts = id.splitn(count, PK_DELIMITER);
    table
        .primary_keys()
        .map(|column| {
            let part = parts.next().ok_or_else(|| {
                BaseModelError::query(format!("{id} : missing primary key part for {}", column.alias))
            })?;
            Ok((
                column.name.clone(),
                Value::from(part).coerce(column.class()),
            ))
        })
        .collect()
}

/// `"pk1" = ? AND "pk2" = ?`, qualified with `qualifier` when given.
pub fn pk_filter(table: &Table, qualifier: Option<&str>, id: &str) -> Result<SQL> {
    let pairs = where_pk(table, id)?;
    Ok(helpers::and(pairs.into_iter().map(|(column, value)| {
        let lhs = match qualifier {
            Some(q) => SQL::qualified(q, column),
            None => SQL::ident(column),
        };
        helpers::eq(lhs, value)
    })))
}

/// Builds the key string of a row keyed by alias or physical name; `None`
/// when a key column is absent or null.
pub fn extract_pk_values(table: &Table, row: &Row) -> Option<String> {
    let mut parts = Vec::with_capacity(table.primary_keys().len());
    for column in table.primary_keys() {
        let value = row.get(&column.alias).or_else(|| row.get(&column.name))?;
        parts.push(value.key_string()?);
    }
    (!parts.is_empty()).then(|| parts.join(PK_DELIMITER))
}
