//! `tokio-postgres` conversions for [`Value`].
//!
//! Postgres binds are typed by the server, so a [`Value`] is converted to the
//! Rust type the parameter's inferred [`Type`] expects. Text parameters are
//! parsed on the way in, which lets filter values arrive as strings.

use crate::error::{BaseModelError, Result};
use crate::value::{Row, Value};
use bytes::BytesMut;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::error::Error;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn Error + Sync + Send>;

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => bool_to_sql(*b, ty, out),
            Value::Integer(i) => int_to_sql(*i, ty, out),
            Value::Real(f) => real_to_sql(*f, ty, out),
            Value::Text(s) => text_to_sql(s, ty, out),
            Value::Blob(b) => b.as_slice().to_sql(ty, out),
            structured => {
                let json = structured.to_json();
                if *ty == Type::JSON || *ty == Type::JSONB {
                    json.to_sql(ty, out)
                } else {
                    json.to_string().to_sql(ty, out)
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn bool_to_sql(b: bool, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    if *ty == Type::BOOL {
        b.to_sql(ty, out)
    } else if is_text(ty) {
        b.to_string().to_sql(ty, out)
    } else {
        int_to_sql(i64::from(b), ty, out)
    }
}

fn int_to_sql(i: i64, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    if *ty == Type::INT2 {
        i16::try_from(i)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(i)?.to_sql(ty, out)
    } else if *ty == Type::FLOAT4 {
        (i as f32).to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        (i as f64).to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        Decimal::from(i).to_sql(ty, out)
    } else if *ty == Type::BOOL {
        (i != 0).to_sql(ty, out)
    } else if is_text(ty) {
        i.to_string().to_sql(ty, out)
    } else {
        i.to_sql(ty, out)
    }
}

fn real_to_sql(f: f64, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    if *ty == Type::FLOAT4 {
        (f as f32).to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        Decimal::from_f64(f)
            .ok_or_else(|| format!("{f} does not fit NUMERIC"))?
            .to_sql(ty, out)
    } else if *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8 {
        if f.fract() != 0.0 {
            return Err(format!("{f} is not an integer").into());
        }
        int_to_sql(f as i64, ty, out)
    } else if is_text(ty) {
        f.to_string().to_sql(ty, out)
    } else {
        f.to_sql(ty, out)
    }
}

fn text_to_sql(s: &str, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    let trimmed = s.trim();
    if *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8 {
        int_to_sql(trimmed.parse::<i64>()?, ty, out)
    } else if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 {
        real_to_sql(trimmed.parse::<f64>()?, ty, out)
    } else if *ty == Type::NUMERIC {
        trimmed.parse::<Decimal>()?.to_sql(ty, out)
    } else if *ty == Type::BOOL {
        matches!(trimmed, "true" | "t" | "1").to_sql(ty, out)
    } else if *ty == Type::UUID {
        uuid::Uuid::parse_str(trimmed)?.to_sql(ty, out)
    } else if *ty == Type::DATE {
        chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")?.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMP {
        parse_naive_datetime(trimmed)?.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMPTZ {
        let parsed = chrono::DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .or_else(|_| parse_naive_datetime(trimmed).map(|naive| naive.and_utc()))?;
        parsed.to_sql(ty, out)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        let json = serde_json::from_str::<serde_json::Value>(s)
            .unwrap_or_else(|_| serde_json::Value::String(s.to_string()));
        json.to_sql(ty, out)
    } else {
        s.to_sql(ty, out)
    }
}

fn parse_naive_datetime(s: &str) -> std::result::Result<chrono::NaiveDateTime, chrono::ParseError> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
}

fn is_text(ty: &Type) -> bool {
    *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
}

/// Decodes a tokio-postgres row into a [`Row`] keyed by result column name.
pub fn row_from_postgres(row: &tokio_postgres::Row) -> Result<Row> {
    let mut out = Row::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode(row, index, column.type_())
            .map_err(|e| BaseModelError::Mapping(format!("{}: {e}", column.name())))?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode(
    row: &tokio_postgres::Row,
    index: usize,
    ty: &Type,
) -> std::result::Result<Value, tokio_postgres::Error> {
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(index)?.map(Value::Bool)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(index)?.map(Value::from)
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(index)?.map(Value::from)
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(index)?.map(Value::Integer)
    } else if *ty == Type::OID {
        row.try_get::<_, Option<u32>>(index)?.map(Value::from)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(index)?
            .map(|f| Value::Real(f64::from(f)))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(index)?.map(Value::Real)
    } else if *ty == Type::NUMERIC {
        row.try_get::<_, Option<Decimal>>(index)?.map(|d| {
            if d.fract().is_zero() {
                d.to_i64().map(Value::Integer).unwrap_or(Value::Null)
            } else {
                d.to_f64().map(Value::Real).unwrap_or(Value::Null)
            }
        })
    } else if *ty == Type::BYTEA {
        row.try_get::<_, Option<Vec<u8>>>(index)?.map(Value::Blob)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<serde_json::Value>>(index)?
            .map(Value::Json)
    } else if *ty == Type::UUID {
        row.try_get::<_, Option<uuid::Uuid>>(index)?
            .map(|u| Value::Text(u.to_string()))
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<chrono::NaiveDate>>(index)?
            .map(|d| Value::Text(d.to_string()))
    } else if *ty == Type::TIME {
        row.try_get::<_, Option<chrono::NaiveTime>>(index)?
            .map(|t| Value::Text(t.to_string()))
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(index)?
            .map(|t| Value::Text(t.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(index)?
            .map(|t| Value::Text(t.to_rfc3339()))
    } else {
        row.try_get::<_, Option<String>>(index)?.map(Value::Text)
    };
    Ok(value.unwrap_or(Value::Null))
}
