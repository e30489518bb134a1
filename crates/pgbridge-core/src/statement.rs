//! Parameterized statements produced by the binder.

use std::fmt;

/// A value bound to a `$n` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Sequences and mappings, bound as `jsonb`.
    Json(serde_json::Value),
}

/// Whether a statement yields rows or only a row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Command,
}

/// SQL text with `$1..$n` placeholders plus the parallel list of values.
///
/// Built fresh for each call and never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    sql: String,
    params: Vec<BindValue>,
    kind: StatementKind,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>, params: Vec<BindValue>, kind: StatementKind) -> Self {
        Self {
            sql: sql.into(),
            params,
            kind,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[BindValue] {
        &self.params
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Number of distinct `$n` placeholders in the SQL text.
    pub fn placeholder_count(&self) -> usize {
        let bytes = self.sql.as_bytes();
        let mut seen = std::collections::BTreeSet::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end > start {
                    seen.insert(&self.sql[start..end]);
                }
                i = end.max(start);
            } else {
                i += 1;
            }
        }
        seen.len()
    }
}

/// Displays the SQL text and the parameter count, never the values.
impl fmt::Display for BoundStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} params]", self.sql, self.params.len())
    }
}
