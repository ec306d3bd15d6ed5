//! `rusqlite` conversions for [`Value`].

use crate::error::Result;
use crate::value::{Row, Value};
use ::rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

impl ToSql for Value {
    fn to_sql(&self) -> ::rusqlite::Result<ToSqlOutput<'_>> {
        let out = match self {
            Value::Null => ToSqlOutput::Owned(::rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::Owned(::rusqlite::types::Value::Integer(i64::from(*b))),
            Value::Integer(i) => ToSqlOutput::Owned(::rusqlite::types::Value::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(::rusqlite::types::Value::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            structured => {
                ToSqlOutput::Owned(::rusqlite::types::Value::Text(structured.to_json().to_string()))
            }
        };
        Ok(out)
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let result = match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(items) => Value::Text(String::from_utf8_lossy(items).into_owned()),
            ValueRef::Blob(items) => Value::Blob(items.to_vec()),
        };
        Ok(result)
    }
}

/// Decodes a rusqlite row into a [`Row`] keyed by result column name.
pub fn row_from_rusqlite(row: &::rusqlite::Row<'_>) -> Result<Row> {
    let stmt = row.as_ref();
    let mut out = Row::with_capacity(stmt.column_count());
    for index in 0..stmt.column_count() {
        let name = stmt.column_name(index)?.to_string();
        let value: Value = row.get(index)?;
        out.insert(name, value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_and_decodes() {
        let conn = ::rusqlite::Connection::open_in_memory().unwrap();
        let mut stmt = conn
            .prepare("SELECT ?1 AS a, ?2 AS b, ?3 AS c, ?4 AS d")
            .unwrap();
        let json = Value::Json(serde_json::json!({"k": 1}));
        let params: [&dyn ToSql; 4] = [
            &Value::Integer(3),
            &Value::Bool(true),
            &Value::Null,
            &json,
        ];
        let row = stmt
            .query_row(params.as_slice(), |r| Ok(row_from_rusqlite(r)))
            .unwrap()
            .unwrap();
        assert_eq!(row["a"], Value::Integer(3));
        assert_eq!(row["b"], Value::Integer(1));
        assert_eq!(row["c"], Value::Null);
        assert_eq!(row["d"], Value::from(r#"{"k":1}"#));
    }
}
