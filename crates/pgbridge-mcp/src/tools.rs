//! Tool registry for MCP tools.
//!
//! Definitions are registered once at startup; the registry is then frozen
//! behind an `Arc` and only read. Registration order is the order
//! `tools/list` reports.

use crate::binder::{BindError, BindLimits, BoundArgs, IDENTIFIER_PATTERN, QUALIFIED_PATTERN};
use crate::error::McpError;
use crate::protocol::{ToolAnnotations, ToolInfo};
use pgbridge_core::BoundStatement;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;

/// Turns validated arguments into a statement.
pub type Handler = fn(&BoundArgs, &BindLimits) -> Result<BoundStatement, BindError>;

/// Declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// A table name, optionally schema-qualified once.
    Identifier,
    /// A sequence of bare column names.
    IdentifierList,
    String,
    Integer,
    Boolean,
    Sequence,
    Mapping,
}

impl ParamKind {
    pub(crate) fn expected(self) -> &'static str {
        match self {
            ParamKind::Identifier => "an identifier",
            ParamKind::IdentifierList => "a sequence of identifiers",
            ParamKind::String => "a string",
            ParamKind::Integer => "an integer",
            ParamKind::Boolean => "a boolean",
            ParamKind::Sequence => "a sequence",
            ParamKind::Mapping => "a mapping",
        }
    }

    fn json_schema(self) -> Value {
        match self {
            ParamKind::Identifier => json!({"type": "string", "pattern": QUALIFIED_PATTERN}),
            ParamKind::IdentifierList => json!({
                "type": "array",
                "items": {"type": "string", "pattern": IDENTIFIER_PATTERN},
            }),
            ParamKind::String => json!({"type": "string"}),
            ParamKind::Integer => json!({"type": "integer"}),
            ParamKind::Boolean => json!({"type": "boolean"}),
            ParamKind::Sequence => json!({"type": "array"}),
            ParamKind::Mapping => json!({"type": "object"}),
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
            description,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Side-effect classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ReadOnly,
    /// Changes the schema (DDL).
    Schema,
    /// Changes rows; subject to the affected-rows guardrail.
    Data,
}

/// A registered tool.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub effect: Effect,
    pub destructive: bool,
    pub handler: Handler,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("effect", &self.effect)
            .field("params", &self.params.iter().map(|p| p.name).collect::<Vec<_>>())
            .finish()
    }
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        effect: Effect,
        handler: Handler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            effect,
            destructive: false,
            handler,
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn destructive(mut self) -> Self {
        self.destructive = true;
        self
    }

    pub fn find_param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn is_mutating(&self) -> bool {
        self.effect != Effect::ReadOnly
    }

    /// JSON Schema for the arguments object.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for spec in &self.params {
            let mut schema = spec.kind.json_schema();
            if let Value::Object(obj) = &mut schema {
                obj.insert("description".to_string(), json!(spec.description));
                if let Some(default) = &spec.default {
                    obj.insert("default".to_string(), default.clone());
                }
            }
            properties.insert(spec.name.to_string(), schema);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    pub fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema(),
            annotations: ToolAnnotations {
                read_only_hint: !self.is_mutating(),
                destructive_hint: self.destructive,
                idempotent_hint: !self.is_mutating(),
            },
            mutating: self.is_mutating(),
        }
    }
}

/// Registry of available MCP tools.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in catalog.
    pub fn with_builtins() -> Result<Self, McpError> {
        let mut registry = Self::new();
        for tool in crate::builtin::catalog() {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: ToolDefinition) -> Result<(), McpError> {
        if self.index.contains_key(&tool.name) {
            return Err(McpError::DuplicateTool { name: tool.name });
        }
        self.index.insert(tool.name.clone(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Look a tool up by name.
    pub fn resolve(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// All tools, in registration order.
    pub fn list(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools.iter().map(ToolDefinition::info).collect()
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Get tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}
