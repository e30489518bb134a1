//! Call results and the error taxonomy.
//!
//! Every tool call ends in a [`CallResult`]. Database failures are classified
//! into an [`ErrorKind`] at the session boundary so nothing escapes unmapped.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Error categories reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnknownTool,
    InvalidArgument,
    Unavailable,
    Conflict,
    Timeout,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnknownTool => "UnknownTool",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(name)
    }
}

/// A failure reported by a database session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DbError {
    pub kind: ErrorKind,
    pub message: String,
    /// SQLSTATE, when the server reported one.
    pub code: Option<String>,
    /// The connection can no longer be trusted and must be discarded.
    pub fatal: bool,
}

impl DbError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            fatal: false,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }
}

/// The error arm of a [`CallResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<DbError> for CallError {
    fn from(err: DbError) -> Self {
        Self {
            kind: err.kind,
            message: err.message,
            code: err.code,
        }
    }
}

/// A protocol-safe cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Column names plus row tuples, in the order the database produced them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<Scalar>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a cell by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Scalar> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}

/// Output of a session, before it becomes a [`CallResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Rows(RowSet),
    Affected(u64),
}

/// The outcome of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    Rows(RowSet),
    Affected { count: u64 },
    Error(CallError),
}

impl CallResult {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        CallResult::Error(CallError {
            kind,
            message: message.into(),
            code: None,
        })
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, CallResult::Error(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            CallResult::Error(e) => Some(e.kind),
            _ => None,
        }
    }

    pub fn rows(&self) -> Option<&RowSet> {
        match self {
            CallResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

impl From<QueryOutput> for CallResult {
    fn from(output: QueryOutput) -> Self {
        match output {
            QueryOutput::Rows(rows) => CallResult::Rows(rows),
            QueryOutput::Affected(count) => CallResult::Affected { count },
        }
    }
}

impl From<DbError> for CallResult {
    fn from(err: DbError) -> Self {
        CallResult::Error(err.into())
    }
}

/// One row rendered as an object whose fields follow column order.
struct RowObject<'a> {
    columns: &'a [String],
    values: &'a [Scalar],
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

struct Rows<'a>(&'a RowSet);

impl Serialize for Rows<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.rows.iter().map(|values| RowObject {
            columns: &self.0.columns,
            values,
        }))
    }
}

/// Serializes as the response envelope:
/// `{ok, columns?, rows?, affected?, error?}`.
impl Serialize for CallResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CallResult::Rows(rows) => {
                let mut s = serializer.serialize_struct("CallResult", 3)?;
                s.serialize_field("ok", &true)?;
                s.serialize_field("columns", &rows.columns)?;
                s.serialize_field("rows", &Rows(rows))?;
                s.end()
            }
            CallResult::Affected { count } => {
                let mut s = serializer.serialize_struct("CallResult", 2)?;
                s.serialize_field("ok", &true)?;
                s.serialize_field("affected", count)?;
                s.end()
            }
            CallResult::Error(error) => {
                let mut s = serializer.serialize_struct("CallResult", 2)?;
                s.serialize_field("ok", &false)?;
                s.serialize_field("error", error)?;
                s.end()
            }
        }
    }
}
