//! Parameter encoding.
//!
//! Bound values are converted to the type the server infers for each
//! placeholder, so a string can land in a `uuid` or `timestamptz` column and
//! an integer can fill a `numeric` one. Parse failures are reported as
//! `InvalidArgument` before the statement runs.

use crate::classify::db_error;
use bigdecimal::FromPrimitive;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use pgbridge_core::{BindValue, BoundStatement, DbError, ErrorKind};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgConnection, PgTypeInfo, PgTypeKind};
use sqlx::types::{BigDecimal, Json};
use sqlx::{Arguments, Executor, TypeInfo};
use std::fmt::Display;
use std::str::FromStr;

fn args_add<T>(args: &mut PgArguments, position: usize, v: T) -> Result<(), DbError>
where
    T: Send + Sync + 'static,
    for<'q> T: sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    args.add(v).map_err(|e| {
        DbError::new(
            ErrorKind::InvalidArgument,
            format!("cannot encode parameter ${}: {}", position, e),
        )
    })
}

/// Server-inferred type of each placeholder, in order.
pub(crate) async fn parameter_types(
    conn: &mut PgConnection,
    sql: &str,
) -> Result<Vec<PgTypeInfo>, DbError> {
    let described = (&mut *conn).describe(sql).await.map_err(db_error)?;
    Ok(described
        .parameters()
        .and_then(|params| params.left())
        .map(|types| types.to_vec())
        .unwrap_or_default())
}

/// Build the argument list for a statement.
pub(crate) async fn arguments(
    conn: &mut PgConnection,
    statement: &BoundStatement,
) -> Result<PgArguments, DbError> {
    let mut args = PgArguments::default();
    if statement.params().is_empty() {
        return Ok(args);
    }
    let hints = parameter_types(conn, statement.sql()).await?;
    for (idx, value) in statement.params().iter().enumerate() {
        add_value(&mut args, idx + 1, value, hints.get(idx))?;
    }
    Ok(args)
}

fn invalid(position: usize, expected: &str, err: impl Display) -> DbError {
    DbError::new(
        ErrorKind::InvalidArgument,
        format!("parameter ${} is not a valid {}: {}", position, expected, err),
    )
}

fn is_text_type(name: &str) -> bool {
    matches!(
        name,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" | "CITEXT" | "citext"
    )
}

fn add_value(
    args: &mut PgArguments,
    position: usize,
    value: &BindValue,
    hint: Option<&PgTypeInfo>,
) -> Result<(), DbError> {
    let type_name = hint.map(|t| t.name()).unwrap_or("");
    match value {
        BindValue::Bool(b) => match type_name {
            "JSON" | "JSONB" => args_add(args, position, Json(serde_json::Value::Bool(*b))),
            name if is_text_type(name) => args_add(args, position, b.to_string()),
            _ => args_add(args, position, *b),
        },
        BindValue::Int(n) => match type_name {
            "NUMERIC" => args_add(args, position, BigDecimal::from(*n)),
            "FLOAT4" | "FLOAT8" => args_add(args, position, *n as f64),
            "JSON" | "JSONB" => args_add(args, position, Json(serde_json::Value::from(*n))),
            name if is_text_type(name) => args_add(args, position, n.to_string()),
            _ => args_add(args, position, *n),
        },
        BindValue::Float(f) => match type_name {
            "NUMERIC" => {
                let decimal = BigDecimal::from_str(&f.to_string())
                    .ok()
                    .or_else(|| BigDecimal::from_f64(*f))
                    .ok_or_else(|| invalid(position, "numeric", f))?;
                args_add(args, position, decimal)
            }
            "JSON" | "JSONB" => args_add(args, position, Json(serde_json::Value::from(*f))),
            name if is_text_type(name) => args_add(args, position, f.to_string()),
            _ => args_add(args, position, *f),
        },
        BindValue::Text(s) => add_text(args, position, s, hint),
        BindValue::Json(v) => add_json(args, position, v, type_name),
    }
}

fn add_text(
    args: &mut PgArguments,
    position: usize,
    text: &str,
    hint: Option<&PgTypeInfo>,
) -> Result<(), DbError> {
    let Some(hint) = hint else {
        return args_add(args, position, text.to_string());
    };
    match hint.name() {
        "UUID" => {
            let id = uuid::Uuid::parse_str(text).map_err(|e| invalid(position, "uuid", e))?;
            args_add(args, position, id)
        }
        "DATE" => {
            let date = NaiveDate::from_str(text).map_err(|e| invalid(position, "date", e))?;
            args_add(args, position, date)
        }
        "TIME" => {
            let time = NaiveTime::from_str(text).map_err(|e| invalid(position, "time", e))?;
            args_add(args, position, time)
        }
        "TIMESTAMP" => {
            let ts = parse_naive_timestamp(text).ok_or_else(|| {
                invalid(position, "timestamp", format!("'{}'", text))
            })?;
            args_add(args, position, ts)
        }
        "TIMESTAMPTZ" => {
            let ts = parse_timestamptz(text).ok_or_else(|| {
                invalid(position, "timestamptz", format!("'{}'", text))
            })?;
            args_add(args, position, ts)
        }
        "NUMERIC" => {
            let decimal =
                BigDecimal::from_str(text).map_err(|e| invalid(position, "numeric", e))?;
            args_add(args, position, decimal)
        }
        "INT2" | "INT4" | "INT8" => {
            let n = text
                .trim()
                .parse::<i64>()
                .map_err(|e| invalid(position, "integer", e))?;
            args_add(args, position, n)
        }
        "FLOAT4" | "FLOAT8" => {
            let f = text
                .trim()
                .parse::<f64>()
                .map_err(|e| invalid(position, "number", e))?;
            args_add(args, position, f)
        }
        "BOOL" => {
            let b = parse_bool(text).ok_or_else(|| invalid(position, "boolean", format!("'{}'", text)))?;
            args_add(args, position, b)
        }
        "JSON" | "JSONB" => {
            let v = serde_json::from_str(text)
                .unwrap_or_else(|_| serde_json::Value::String(text.to_string()));
            args_add(args, position, Json(v))
        }
        _ if matches!(hint.kind(), PgTypeKind::Enum(_)) => args_add(
            args,
            position,
            EnumLabel {
                label: text.to_string(),
                type_info: hint.clone(),
            },
        ),
        _ => args_add(args, position, text.to_string()),
    }
}

fn add_json(
    args: &mut PgArguments,
    position: usize,
    value: &serde_json::Value,
    type_name: &str,
) -> Result<(), DbError> {
    use serde_json::Value;

    let items = match value {
        Value::Array(items) => Some(items),
        _ => None,
    };
    match (type_name, items) {
        ("TEXT[]" | "VARCHAR[]" | "BPCHAR[]", Some(items)) => {
            let texts: Vec<Option<String>> = items
                .iter()
                .map(|v| match v {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect();
            args_add(args, position, texts)
        }
        ("INT2[]" | "INT4[]" | "INT8[]", Some(items)) => {
            let ints = items
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    other => other.as_i64().map(Some).ok_or_else(|| {
                        invalid(position, "integer array", format!("element {}", other))
                    }),
                })
                .collect::<Result<Vec<Option<i64>>, DbError>>()?;
            args_add(args, position, ints)
        }
        ("FLOAT4[]" | "FLOAT8[]", Some(items)) => {
            let floats = items
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    other => other.as_f64().map(Some).ok_or_else(|| {
                        invalid(position, "number array", format!("element {}", other))
                    }),
                })
                .collect::<Result<Vec<Option<f64>>, DbError>>()?;
            args_add(args, position, floats)
        }
        ("BOOL[]", Some(items)) => {
            let bools = items
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    other => other.as_bool().map(Some).ok_or_else(|| {
                        invalid(position, "boolean array", format!("element {}", other))
                    }),
                })
                .collect::<Result<Vec<Option<bool>>, DbError>>()?;
            args_add(args, position, bools)
        }
        (name, _) if is_text_type(name) => args_add(args, position, value.to_string()),
        _ => args_add(args, position, Json(value.clone())),
    }
}

pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_naive_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::from_str(text)
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::from_str(text)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// RFC 3339 first; a timestamp without offset is taken as UTC.
pub(crate) fn parse_timestamptz(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .or_else(|| DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%#z").ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| parse_naive_timestamp(trimmed).map(|naive| naive.and_utc()))
}

/// A label for a user-defined enum. Enum values share the text wire format,
/// so the label is sent as-is under the enum's own type.
struct EnumLabel {
    label: String,
    type_info: PgTypeInfo,
}

impl sqlx::Type<sqlx::Postgres> for EnumLabel {
    fn type_info() -> PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for EnumLabel {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <String as sqlx::Encode<'q, sqlx::Postgres>>::encode_by_ref(&self.label, buf)
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(self.type_info.clone())
    }
}
