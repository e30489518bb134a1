//! Result Normalizer: Postgres rows to protocol-safe scalars.
//!
//! Cells are decoded by the column's type name. Types with no direct JSON
//! equivalent are rendered as their canonical text.

use bigdecimal::ToPrimitive;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use pgbridge_core::{RowSet, Scalar};
use sqlx::postgres::{PgColumn, PgRow, PgTypeKind};
use sqlx::types::BigDecimal;
use sqlx::{Column, Row, TypeInfo};
use std::fmt::Write;
use std::str::FromStr;

/// Column names of a result, verbatim and in order.
pub fn column_names(columns: &[PgColumn]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

/// Convert fetched rows into a [`RowSet`], preserving row order.
pub fn row_set(columns: Vec<String>, rows: &[PgRow]) -> Result<RowSet, sqlx::Error> {
    let mut set = RowSet::new(columns);
    for row in rows {
        let mut cells = Vec::with_capacity(row.len());
        for (idx, column) in row.columns().iter().enumerate() {
            cells.push(cell(row, idx, column)?);
        }
        set.push(cells);
    }
    Ok(set)
}

fn get<'r, T>(row: &'r PgRow, idx: usize) -> Result<Option<T>, sqlx::Error>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(idx)
}

fn text<T: ToString>(value: Option<T>) -> Scalar {
    value.map_or(Scalar::Null, |v| Scalar::Text(v.to_string()))
}

/// A one-dimensional array column, each element rendered by `render`.
fn array<'r, T, F>(row: &'r PgRow, idx: usize, render: F) -> Result<Scalar, sqlx::Error>
where
    Vec<Option<T>>: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    F: Fn(T) -> String,
{
    Ok(get::<Vec<Option<T>>>(row, idx)?.map_or(Scalar::Null, |items| {
        let rendered: Vec<Option<String>> =
            items.into_iter().map(|item| item.map(&render)).collect();
        Scalar::Text(array_literal(&rendered))
    }))
}

fn cell(row: &PgRow, idx: usize, column: &PgColumn) -> Result<Scalar, sqlx::Error> {
    let type_info = column.type_info();
    let scalar = match type_info.name() {
        "BOOL" => get::<bool>(row, idx)?.map_or(Scalar::Null, Scalar::Bool),
        "INT2" => get::<i16>(row, idx)?.map_or(Scalar::Null, |v| Scalar::Int(v.into())),
        "INT4" => get::<i32>(row, idx)?.map_or(Scalar::Null, |v| Scalar::Int(v.into())),
        "INT8" => get::<i64>(row, idx)?.map_or(Scalar::Null, Scalar::Int),
        "OID" => get::<sqlx::postgres::types::Oid>(row, idx)?
            .map_or(Scalar::Null, |v| Scalar::Int(v.0.into())),
        "FLOAT4" => get::<f32>(row, idx)?.map_or(Scalar::Null, |v| float_scalar(v.into())),
        "FLOAT8" => get::<f64>(row, idx)?.map_or(Scalar::Null, float_scalar),
        "NUMERIC" => get::<BigDecimal>(row, idx)?.map_or(Scalar::Null, |v| numeric_scalar(&v)),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "citext" => {
            get::<String>(row, idx)?.map_or(Scalar::Null, Scalar::Text)
        }
        // the single-byte "char" type
        "CHAR" => get::<i8>(row, idx)?.map_or(Scalar::Null, |v| Scalar::Text(char_byte(v))),
        "UUID" => text(get::<uuid::Uuid>(row, idx)?.map(|u| u.hyphenated())),
        "JSON" | "JSONB" => text(get::<serde_json::Value>(row, idx)?),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, idx)?
            .map_or(Scalar::Null, |v| Scalar::Text(v.to_rfc3339())),
        "TIMESTAMP" => get::<NaiveDateTime>(row, idx)?
            .map_or(Scalar::Null, |v| Scalar::Text(naive_timestamp(&v))),
        "DATE" => text(get::<NaiveDate>(row, idx)?),
        "TIME" => text(get::<NaiveTime>(row, idx)?),
        "BYTEA" => get::<Vec<u8>>(row, idx)?.map_or(Scalar::Null, |v| Scalar::Text(hex_bytes(&v))),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => array(row, idx, |v: String| v)?,
        "CHAR[]" => array(row, idx, char_byte)?,
        "INT2[]" => array(row, idx, |v: i16| v.to_string())?,
        "INT4[]" => array(row, idx, |v: i32| v.to_string())?,
        "INT8[]" => array(row, idx, |v: i64| v.to_string())?,
        "FLOAT4[]" => array(row, idx, |v: f32| v.to_string())?,
        "FLOAT8[]" => array(row, idx, |v: f64| v.to_string())?,
        "NUMERIC[]" => array(row, idx, |v: BigDecimal| v.to_string())?,
        "BOOL[]" => array(row, idx, |v: bool| v.to_string())?,
        "UUID[]" => array(row, idx, |v: uuid::Uuid| v.hyphenated().to_string())?,
        "DATE[]" => array(row, idx, |v: NaiveDate| v.to_string())?,
        "TIME[]" => array(row, idx, |v: NaiveTime| v.to_string())?,
        "TIMESTAMP[]" => array(row, idx, |v: NaiveDateTime| naive_timestamp(&v))?,
        "TIMESTAMPTZ[]" => array(row, idx, |v: DateTime<Utc>| v.to_rfc3339())?,
        "JSON[]" | "JSONB[]" => array(row, idx, |v: serde_json::Value| v.to_string())?,
        "BYTEA[]" => array(row, idx, |v: Vec<u8>| hex_bytes(&v))?,
        other => match type_info.kind() {
            // enum values travel as their label
            PgTypeKind::Enum(_) => row
                .try_get_unchecked::<Option<String>, _>(idx)?
                .map_or(Scalar::Null, Scalar::Text),
            _ => {
                let raw = row.try_get_raw(idx)?;
                if sqlx::ValueRef::is_null(&raw) {
                    Scalar::Null
                } else {
                    Scalar::Text(format!("<unsupported:{}>", other))
                }
            }
        },
    };
    Ok(scalar)
}

fn naive_timestamp(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// `"char"` holds one byte; render it as that character.
fn char_byte(value: i8) -> String {
    char::from(value as u8).to_string()
}

/// Non-finite floats have no JSON number form.
pub fn float_scalar(value: f64) -> Scalar {
    if value.is_finite() {
        Scalar::Float(value)
    } else {
        Scalar::Text(value.to_string())
    }
}

/// `numeric` as an integer or float when the value survives the trip through
/// JSON unchanged, otherwise as its canonical text.
pub fn numeric_scalar(value: &BigDecimal) -> Scalar {
    if value.is_integer()
        && let Some(int) = value.to_i64()
    {
        return Scalar::Int(int);
    }
    if let Some(float) = value.to_f64()
        && float.is_finite()
        && let Ok(back) = BigDecimal::from_str(&float.to_string())
        && &back == value
    {
        return Scalar::Float(float);
    }
    Scalar::Text(value.normalized().to_string())
}

/// `bytea` in Postgres hex output form.
pub fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// One-dimensional array in Postgres `{a,b}` output form.
pub fn array_literal<T: ToString>(items: &[Option<T>]) -> String {
    let mut out = String::from("{");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match item {
            None => out.push_str("NULL"),
            Some(v) => push_array_element(&mut out, &v.to_string()),
        }
    }
    out.push('}');
    out
}

fn push_array_element(out: &mut String, element: &str) {
    let needs_quotes = element.is_empty()
        || element.eq_ignore_ascii_case("null")
        || element
            .chars()
            .any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        out.push_str(element);
        return;
    }
    out.push('"');
    for c in element.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}
