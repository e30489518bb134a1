//! Caller-supplied argument values.
//!
//! Arguments arrive as JSON and are converted once into [`ArgValue`], a closed
//! sum type the binder matches on. Mapping keys are kept in sorted order so
//! every statement built from a mapping has a deterministic placeholder order.

use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A typed argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<ArgValue>),
    Mapping(BTreeMap<String, ArgValue>),
}

/// The kind of an [`ArgValue`], used in type-mismatch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Sequence,
    Mapping,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Float => "number",
            ValueKind::String => "string",
            ValueKind::Sequence => "sequence",
            ValueKind::Mapping => "mapping",
        };
        f.write_str(name)
    }
}

impl ArgValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ArgValue::Null => ValueKind::Null,
            ArgValue::Bool(_) => ValueKind::Boolean,
            ArgValue::Integer(_) => ValueKind::Integer,
            ArgValue::Float(_) => ValueKind::Float,
            ArgValue::String(_) => ValueKind::String,
            ArgValue::Sequence(_) => ValueKind::Sequence,
            ArgValue::Mapping(_) => ValueKind::Mapping,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ArgValue::Null)
    }

    /// Scalars are everything except sequences and mappings.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, ArgValue::Sequence(_) | ArgValue::Mapping(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ArgValue]> {
        match self {
            ArgValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, ArgValue>> {
        match self {
            ArgValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Convert back to JSON (used when a nested value is bound as `jsonb`).
    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::Null => Value::Null,
            ArgValue::Bool(b) => Value::Bool(*b),
            ArgValue::Integer(n) => Value::Number((*n).into()),
            ArgValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            ArgValue::String(s) => Value::String(s.clone()),
            ArgValue::Sequence(items) => Value::Array(items.iter().map(ArgValue::to_json).collect()),
            ArgValue::Mapping(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ArgValue::Null,
            Value::Bool(b) => ArgValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ArgValue::Integer(i),
                // u64 beyond i64::MAX and fractional numbers
                None => ArgValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => ArgValue::String(s),
            Value::Array(items) => ArgValue::Sequence(items.into_iter().map(ArgValue::from).collect()),
            Value::Object(map) => ArgValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, ArgValue::from(v)))
                    .collect(),
            ),
        }
    }
}
