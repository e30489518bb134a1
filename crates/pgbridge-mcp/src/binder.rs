//! Statement Binder.
//!
//! Turns a tool's declared parameters plus caller arguments into a
//! [`BoundStatement`]. Caller values only ever travel as `$n` parameters;
//! identifiers pass a strict pattern check and are emitted double-quoted.

use crate::tools::{ParamKind, ToolDefinition};
use pgbridge_core::{ArgValue, BindValue, BoundStatement, GuardrailsConfig, StatementKind, ValueKind};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Unquoted Postgres identifier, at most 63 bytes.
pub const IDENTIFIER_PATTERN: &str = "^[A-Za-z_][A-Za-z0-9_]{0,62}$";

/// An identifier with at most one schema qualifier.
pub const QUALIFIED_PATTERN: &str =
    "^([A-Za-z_][A-Za-z0-9_]{0,62}\\.)?[A-Za-z_][A-Za-z0-9_]{0,62}$";

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IDENTIFIER_PATTERN).expect("identifier pattern compiles"));

static COLUMN_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?P<name>smallint|integer|int|bigint|serial|bigserial|real|double\s+precision|numeric|decimal|text|varchar|char|boolean|bool|date|time|timestamptz|timestamp|uuid|jsonb|json|bytea)\s*(?:\(\s*(?P<p>\d{1,4})\s*(?:,\s*(?P<s>\d{1,4})\s*)?\))?\s*$",
    )
    .expect("column type pattern compiles")
});

/// Why a call's arguments were rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error("missing required argument: {0}")]
    Missing(String),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),

    #[error("argument {name} must be {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: ValueKind,
    },

    #[error("argument {name} is not a valid identifier: {value:?}")]
    InvalidIdentifier { name: String, value: String },

    #[error("argument {name} is malformed: {reason}")]
    Malformed { name: String, reason: String },
}

impl BindError {
    pub fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        BindError::Malformed {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Row limits the `select` family applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindLimits {
    pub default_row_limit: u64,
    pub max_rows_per_query: u64,
}

impl Default for BindLimits {
    fn default() -> Self {
        Self::from(&GuardrailsConfig::default())
    }
}

impl From<&GuardrailsConfig> for BindLimits {
    fn from(config: &GuardrailsConfig) -> Self {
        Self {
            default_row_limit: config.default_row_limit,
            max_rows_per_query: config.max_rows_per_query,
        }
    }
}

impl BindLimits {
    /// Row limit for a query: the caller's value or the default, never above
    /// the maximum.
    pub fn row_limit(&self, requested: Option<i64>) -> Result<i64, BindError> {
        let limit = match requested {
            Some(n) if n <= 0 => {
                return Err(BindError::malformed("limit", "must be a positive integer"));
            }
            Some(n) => n as u64,
            None => self.default_row_limit,
        };
        Ok(limit.min(self.max_rows_per_query).min(i64::MAX as u64) as i64)
    }
}

/// Validated arguments handed to a tool handler.
///
/// Defaults have been applied and explicit nulls for optional parameters
/// removed, so `get` only returns values the caller meant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    values: BTreeMap<String, ArgValue>,
}

impl BoundArgs {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    fn require(&self, name: &str) -> Result<&ArgValue, BindError> {
        self.get(name)
            .ok_or_else(|| BindError::Missing(name.to_string()))
    }

    pub fn str(&self, name: &str) -> Result<&str, BindError> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| mismatch(name, "a string", value))
    }

    pub fn opt_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ArgValue::as_i64)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name).and_then(ArgValue::as_bool).unwrap_or(false)
    }

    pub fn mapping(&self, name: &str) -> Result<&BTreeMap<String, ArgValue>, BindError> {
        let value = self.require(name)?;
        value.as_mapping().ok_or_else(|| mismatch(name, "a mapping", value))
    }

    pub fn opt_mapping(&self, name: &str) -> Option<&BTreeMap<String, ArgValue>> {
        self.get(name).and_then(ArgValue::as_mapping)
    }

    pub fn sequence(&self, name: &str) -> Result<&[ArgValue], BindError> {
        let value = self.require(name)?;
        value.as_sequence().ok_or_else(|| mismatch(name, "a sequence", value))
    }

    pub fn opt_sequence(&self, name: &str) -> Option<&[ArgValue]> {
        self.get(name).and_then(ArgValue::as_sequence)
    }

    /// A (possibly schema-qualified) table name.
    pub fn table(&self, name: &str) -> Result<QualifiedName, BindError> {
        QualifiedName::parse(name, self.str(name)?)
    }
}

fn mismatch(name: &str, expected: &'static str, value: &ArgValue) -> BindError {
    BindError::TypeMismatch {
        name: name.to_string(),
        expected,
        actual: value.kind(),
    }
}

/// Check a bare identifier.
pub fn identifier<'a>(param: &str, raw: &'a str) -> Result<&'a str, BindError> {
    if IDENTIFIER_RE.is_match(raw) {
        Ok(raw)
    } else {
        Err(BindError::InvalidIdentifier {
            name: param.to_string(),
            value: raw.to_string(),
        })
    }
}

/// Double-quote an identifier that already passed [`identifier`].
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident)
}

/// `name` or `schema.name`, both parts validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn parse(param: &str, raw: &str) -> Result<Self, BindError> {
        let invalid = || BindError::InvalidIdentifier {
            name: param.to_string(),
            value: raw.to_string(),
        };
        let mut parts = raw.split('.');
        let (schema, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => (None, name),
            (Some(schema), Some(name), None) => (Some(schema), name),
            _ => return Err(invalid()),
        };
        if let Some(schema) = schema {
            identifier(param, schema).map_err(|_| invalid())?;
        }
        identifier(param, name).map_err(|_| invalid())?;
        Ok(Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{}.", quote_ident(schema))?;
        }
        f.write_str(&quote_ident(&self.name))
    }
}

/// Canonical spelling of an allow-listed column type.
pub fn column_type(param: &str, raw: &str) -> Result<String, BindError> {
    let rejected = || BindError::malformed(param, format!("unsupported column type {:?}", raw));
    let caps = COLUMN_TYPE_RE.captures(raw).ok_or_else(rejected)?;
    let name = caps
        .name("name")
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase())
        .ok_or_else(rejected)?;
    let precision = caps.name("p").map(|m| m.as_str());
    let scale = caps.name("s").map(|m| m.as_str());

    match (name.as_str(), precision, scale) {
        ("numeric" | "decimal", Some(p), Some(s)) => Ok(format!("{}({},{})", name, p, s)),
        ("numeric" | "decimal", Some(p), None) => Ok(format!("{}({})", name, p)),
        ("varchar" | "char", Some(n), None) => Ok(format!("{}({})", name, n)),
        ("varchar" | "char", _, _) => Err(BindError::malformed(
            param,
            format!("{} requires a single length, e.g. {}(255)", name, name),
        )),
        (_, None, None) => Ok(name),
        _ => Err(rejected()),
    }
}

/// Incrementally builds SQL text and the parallel parameter list.
#[derive(Debug, Default)]
pub struct StatementBuilder {
    sql: String,
    params: Vec<BindValue>,
}

impl StatementBuilder {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Bind a value and return its placeholder. Null binds nothing and
    /// yields `NULL`.
    pub fn param(&mut self, value: &ArgValue) -> String {
        match bind_value(value) {
            Some(v) => {
                self.params.push(v);
                format!("${}", self.params.len())
            }
            None => "NULL".to_string(),
        }
    }

    /// `"col" = $n` pairs joined by `AND`; null becomes `IS NULL`.
    pub fn push_filter(
        &mut self,
        param: &str,
        filter: &BTreeMap<String, ArgValue>,
    ) -> Result<&mut Self, BindError> {
        for (i, (column, value)) in filter.iter().enumerate() {
            let raw = identifier(param, column)?;
            let column = quote_ident(raw);
            if !value.is_scalar() {
                return Err(BindError::TypeMismatch {
                    name: format!("{}.{}", param, raw),
                    expected: "a scalar",
                    actual: value.kind(),
                });
            }
            if i > 0 {
                self.sql.push_str(" AND ");
            }
            if value.is_null() {
                self.sql.push_str(&format!("{} IS NULL", column));
            } else {
                let placeholder = self.param(value);
                self.sql.push_str(&format!("{} = {}", column, placeholder));
            }
        }
        Ok(self)
    }

    pub fn finish(self, kind: StatementKind) -> BoundStatement {
        BoundStatement::new(self.sql, self.params, kind)
    }
}

/// Non-null argument values as statement parameters.
pub fn bind_value(value: &ArgValue) -> Option<BindValue> {
    match value {
        ArgValue::Null => None,
        ArgValue::Bool(b) => Some(BindValue::Bool(*b)),
        ArgValue::Integer(n) => Some(BindValue::Int(*n)),
        ArgValue::Float(f) => Some(BindValue::Float(*f)),
        ArgValue::String(s) => Some(BindValue::Text(s.clone())),
        nested @ (ArgValue::Sequence(_) | ArgValue::Mapping(_)) => {
            Some(BindValue::Json(nested.to_json()))
        }
    }
}

fn check_kind(name: &str, kind: ParamKind, value: &ArgValue) -> Result<(), BindError> {
    let accepted = match kind {
        ParamKind::Identifier => {
            let raw = value.as_str().ok_or_else(|| mismatch(name, kind.expected(), value))?;
            QualifiedName::parse(name, raw)?;
            true
        }
        ParamKind::IdentifierList => {
            let items = value
                .as_sequence()
                .ok_or_else(|| mismatch(name, kind.expected(), value))?;
            for item in items {
                let raw = item
                    .as_str()
                    .ok_or_else(|| mismatch(name, "a sequence of strings", item))?;
                identifier(name, raw)?;
            }
            true
        }
        ParamKind::String => matches!(value, ArgValue::String(_)),
        ParamKind::Integer => matches!(value, ArgValue::Integer(_)),
        ParamKind::Boolean => matches!(value, ArgValue::Bool(_)),
        ParamKind::Sequence => matches!(value, ArgValue::Sequence(_)),
        ParamKind::Mapping => matches!(value, ArgValue::Mapping(_)),
    };
    if accepted {
        Ok(())
    } else {
        Err(mismatch(name, kind.expected(), value))
    }
}

/// Validate `arguments` against `definition` and build its statement.
pub fn bind(
    definition: &ToolDefinition,
    arguments: &BTreeMap<String, ArgValue>,
    limits: &BindLimits,
) -> Result<BoundStatement, BindError> {
    if let Some(unknown) = arguments.keys().find(|k| definition.find_param(k).is_none()) {
        return Err(BindError::UnknownArgument(unknown.clone()));
    }

    let mut values = BTreeMap::new();
    for spec in &definition.params {
        let supplied = arguments.get(spec.name).filter(|v| !v.is_null());
        let value = match (supplied, &spec.default) {
            (Some(v), _) => v.clone(),
            (None, Some(default)) => ArgValue::from(default.clone()),
            (None, None) if spec.required => return Err(BindError::Missing(spec.name.to_string())),
            (None, None) => continue,
        };
        check_kind(spec.name, spec.kind, &value)?;
        values.insert(spec.name.to_string(), value);
    }

    let statement = (definition.handler)(&BoundArgs { values }, limits)?;
    debug_assert_eq!(statement.placeholder_count(), statement.params().len());
    Ok(statement)
}
