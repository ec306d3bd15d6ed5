//! Alias translation.
//!
//! Callers speak column aliases; statements use physical names. Both
//! directions are pure functions of the table's columns.

use crate::schema::Table;
use basemodel_core::Row;

/// Keys every recognized column by its physical name. Keys that are neither
/// an alias nor a physical name are dropped.
pub fn to_physical(table: &Table, row: &Row) -> Row {
    row.iter()
        .filter_map(|(key, value)| {
            table
                .column(key)
                .map(|column| (column.name.clone(), value.clone()))
        })
        .collect()
}

/// Keys every physical column by its alias. Other keys (nested relation
/// properties, virtual columns, aggregates) pass through unchanged.
pub fn to_alias(table: &Table, row: Row) -> Row {
    row.into_iter()
        .map(|(key, value)| match table.column(&key) {
            Some(column) if column.name == key => (column.alias.clone(), value),
            _ => (key, value),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use basemodel_core::Value;
    use basemodel_types::ColumnType;

    fn table() -> Table {
        Table::new(
            "orders".into(),
            "Orders".into(),
            vec![
                Column::id("id").alias("Id"),
                Column::new("title", ColumnType::SingleLineText).alias("Title"),
                Column::new("qty", ColumnType::Number),
            ],
        )
        .unwrap()
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn drops_unknown_keys() {
        let physical = to_physical(
            &table(),
            &row(&[("Title", "a".into()), ("bogus", 1.into()), ("qty", 2.into())]),
        );
        assert_eq!(physical, row(&[("title", "a".into()), ("qty", 2.into())]));
    }

    #[test]
    fn round_trip_is_stable() {
        let table = table();
        let inputs = [
            row(&[("Id", 1.into()), ("Title", "x".into())]),
            row(&[("id", 1.into()), ("title", "x".into()), ("qty", Value::Null)]),
            row(&[("Title", "y".into()), ("itemsList", Value::List(vec![]))]),
            Row::new(),
        ];
        for input in inputs {
            let physical = to_physical(&table, &input);
            let again = to_physical(&table, &to_alias(&table, physical.clone()));
            assert_eq!(again, physical);
            // already physical input is a no-op
            assert_eq!(to_physical(&table, &physical), physical);
        }
    }

    #[test]
    fn alias_keeps_nested_properties() {
        let aliased = to_alias(
            &table(),
            row(&[("title", "x".into()), ("itemsList", Value::List(vec![]))]),
        );
        assert_eq!(
            aliased.keys().collect::<Vec<_>>(),
            ["Title", "itemsList"]
        );
    }
}
