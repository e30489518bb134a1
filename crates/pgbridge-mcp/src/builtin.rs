//! The built-in tool catalog.
//!
//! Each handler receives arguments the binder has already checked against
//! the declared parameter kinds and returns one statement.

use crate::binder::{
    BindError, BindLimits, BoundArgs, QualifiedName, StatementBuilder, column_type, identifier,
    quote_ident,
};
use crate::tools::{Effect, ParamKind, ParamSpec, ToolDefinition};
use pgbridge_core::{ArgValue, BoundStatement, StatementKind};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

const DEFAULT_SCHEMA: &str = "public";

/// Every built-in tool, in catalog order.
pub fn catalog() -> Vec<ToolDefinition> {
    vec![
        list_tables_tool(),
        describe_table_tool(),
        select_tool(),
        insert_tool(),
        update_tool(),
        delete_tool(),
        create_table_tool(),
        drop_table_tool(),
    ]
}

fn table_param() -> ParamSpec {
    ParamSpec::required("table", ParamKind::Identifier, "Table name, optionally schema-qualified")
}

fn returning_param() -> ParamSpec {
    ParamSpec::optional("returning", ParamKind::Boolean, "Return the affected rows")
        .with_default(json!(false))
}

fn schema_param() -> ParamSpec {
    ParamSpec::optional("schema", ParamKind::String, "Schema to inspect")
        .with_default(json!(DEFAULT_SCHEMA))
}

// =============================================================================
// SCHEMA DISCOVERY
// =============================================================================

fn list_tables_tool() -> ToolDefinition {
    ToolDefinition::new(
        "list_tables",
        "List the tables and views of a schema",
        Effect::ReadOnly,
        list_tables,
    )
    .param(schema_param())
}

fn list_tables(args: &BoundArgs, _: &BindLimits) -> Result<BoundStatement, BindError> {
    let mut builder = StatementBuilder::new(
        "SELECT table_name::text AS table_name, table_type::text AS table_type \
         FROM information_schema.tables WHERE table_schema = ",
    );
    let schema = builder.param(&ArgValue::String(args.str("schema")?.to_string()));
    builder.push(&schema).push(" ORDER BY table_name");
    Ok(builder.finish(StatementKind::Query))
}

fn describe_table_tool() -> ToolDefinition {
    ToolDefinition::new(
        "describe_table",
        "Describe the columns of a table in ordinal order",
        Effect::ReadOnly,
        describe_table,
    )
    .param(table_param())
    .param(schema_param())
}

fn describe_table(args: &BoundArgs, _: &BindLimits) -> Result<BoundStatement, BindError> {
    let table = args.table("table")?;
    // a qualified table name wins over the schema argument
    let schema = match &table.schema {
        Some(schema) => schema.clone(),
        None => args.str("schema")?.to_string(),
    };

    let mut builder = StatementBuilder::new(
        "SELECT column_name::text AS column_name, data_type::text AS data_type, \
         (is_nullable = 'YES') AS nullable, column_default::text AS column_default \
         FROM information_schema.columns WHERE table_schema = ",
    );
    let schema = builder.param(&ArgValue::String(schema));
    builder.push(&schema).push(" AND table_name = ");
    let name = builder.param(&ArgValue::String(table.name));
    builder.push(&name).push(" ORDER BY ordinal_position");
    Ok(builder.finish(StatementKind::Query))
}

// =============================================================================
// DATA
// =============================================================================

fn select_tool() -> ToolDefinition {
    ToolDefinition::new(
        "select",
        "Read rows from a table with optional projection, equality filter, ordering and limit",
        Effect::ReadOnly,
        select,
    )
    .param(table_param())
    .param(ParamSpec::optional(
        "columns",
        ParamKind::IdentifierList,
        "Columns to return (default: all)",
    ))
    .param(ParamSpec::optional(
        "filter",
        ParamKind::Mapping,
        "Column to value equality conditions, AND-ed; null matches IS NULL",
    ))
    .param(ParamSpec::optional(
        "order_by",
        ParamKind::Sequence,
        "Sort keys: \"column\" or \"column asc|desc\"",
    ))
    .param(ParamSpec::optional(
        "limit",
        ParamKind::Integer,
        "Maximum rows to return",
    ))
}

fn select(args: &BoundArgs, limits: &BindLimits) -> Result<BoundStatement, BindError> {
    let table = args.table("table")?;
    let projection = match args.opt_sequence("columns") {
        Some(columns) if !columns.is_empty() => column_list("columns", columns)?,
        _ => "*".to_string(),
    };

    let mut builder = StatementBuilder::new(format!("SELECT {} FROM {}", projection, table));
    if let Some(filter) = args.opt_mapping("filter")
        && !filter.is_empty()
    {
        builder.push(" WHERE ").push_filter("filter", filter)?;
    }
    if let Some(keys) = args.opt_sequence("order_by")
        && !keys.is_empty()
    {
        builder.push(" ORDER BY ").push(&order_by(keys)?);
    }
    let limit = limits.row_limit(args.opt_i64("limit"))?;
    let placeholder = builder.param(&ArgValue::Integer(limit));
    builder.push(" LIMIT ").push(&placeholder);
    Ok(builder.finish(StatementKind::Query))
}

fn column_list(param: &str, columns: &[ArgValue]) -> Result<String, BindError> {
    let mut quoted = Vec::with_capacity(columns.len());
    for column in columns {
        let raw = column.as_str().ok_or_else(|| BindError::TypeMismatch {
            name: param.to_string(),
            expected: "a sequence of identifiers",
            actual: column.kind(),
        })?;
        quoted.push(quote_ident(identifier(param, raw)?));
    }
    Ok(quoted.join(", "))
}

fn order_by(keys: &[ArgValue]) -> Result<String, BindError> {
    let mut rendered = Vec::with_capacity(keys.len());
    for key in keys {
        let raw = key.as_str().ok_or_else(|| BindError::TypeMismatch {
            name: "order_by".to_string(),
            expected: "a sequence of strings",
            actual: key.kind(),
        })?;
        let mut parts = raw.split_whitespace();
        let column = parts
            .next()
            .ok_or_else(|| BindError::malformed("order_by", "empty sort key"))?;
        let column = quote_ident(identifier("order_by", column)?);
        let direction = match parts.next() {
            None => "ASC",
            Some(d) if d.eq_ignore_ascii_case("asc") => "ASC",
            Some(d) if d.eq_ignore_ascii_case("desc") => "DESC",
            Some(d) => {
                return Err(BindError::malformed(
                    "order_by",
                    format!("unknown sort direction {:?}", d),
                ));
            }
        };
        if parts.next().is_some() {
            return Err(BindError::malformed(
                "order_by",
                format!("expected \"column [asc|desc]\", got {:?}", raw),
            ));
        }
        rendered.push(format!("{} {}", column, direction));
    }
    Ok(rendered.join(", "))
}

fn non_empty<'a>(
    args: &'a BoundArgs,
    param: &str,
) -> Result<&'a BTreeMap<String, ArgValue>, BindError> {
    let map = args.mapping(param)?;
    if map.is_empty() {
        return Err(BindError::malformed(param, "must not be empty"));
    }
    Ok(map)
}

fn finish_mutation(mut builder: StatementBuilder, returning: bool) -> BoundStatement {
    if returning {
        builder.push(" RETURNING *");
        builder.finish(StatementKind::Query)
    } else {
        builder.finish(StatementKind::Command)
    }
}

fn insert_tool() -> ToolDefinition {
    ToolDefinition::new("insert", "Insert one row", Effect::Data, insert)
        .param(table_param())
        .param(ParamSpec::required(
            "values",
            ParamKind::Mapping,
            "Column to value mapping",
        ))
        .param(returning_param())
}

fn insert(args: &BoundArgs, _: &BindLimits) -> Result<BoundStatement, BindError> {
    let table = args.table("table")?;
    let values = non_empty(args, "values")?;

    let mut columns = Vec::with_capacity(values.len());
    for column in values.keys() {
        columns.push(quote_ident(identifier("values", column)?));
    }
    let mut builder = StatementBuilder::new(format!("INSERT INTO {} ({}) VALUES (", table, columns.join(", ")));
    for (i, value) in values.values().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        let placeholder = builder.param(value);
        builder.push(&placeholder);
    }
    builder.push(")");
    Ok(finish_mutation(builder, args.flag("returning")))
}

fn update_tool() -> ToolDefinition {
    ToolDefinition::new("update", "Update the rows matching a filter", Effect::Data, update)
        .destructive()
        .param(table_param())
        .param(ParamSpec::required(
            "values",
            ParamKind::Mapping,
            "Column to new value mapping",
        ))
        .param(ParamSpec::required(
            "filter",
            ParamKind::Mapping,
            "Column to value equality conditions, AND-ed; null matches IS NULL",
        ))
        .param(returning_param())
}

fn update(args: &BoundArgs, _: &BindLimits) -> Result<BoundStatement, BindError> {
    let table = args.table("table")?;
    let values = non_empty(args, "values")?;
    let filter = non_empty(args, "filter")?;

    let mut builder = StatementBuilder::new(format!("UPDATE {} SET ", table));
    for (i, (column, value)) in values.iter().enumerate() {
        let column = quote_ident(identifier("values", column)?);
        if i > 0 {
            builder.push(", ");
        }
        let placeholder = builder.param(value);
        builder.push(&format!("{} = {}", column, placeholder));
    }
    builder.push(" WHERE ").push_filter("filter", filter)?;
    Ok(finish_mutation(builder, args.flag("returning")))
}

fn delete_tool() -> ToolDefinition {
    ToolDefinition::new("delete", "Delete the rows matching a filter", Effect::Data, delete)
        .destructive()
        .param(table_param())
        .param(ParamSpec::required(
            "filter",
            ParamKind::Mapping,
            "Column to value equality conditions, AND-ed; null matches IS NULL",
        ))
        .param(returning_param())
}

fn delete(args: &BoundArgs, _: &BindLimits) -> Result<BoundStatement, BindError> {
    let table = args.table("table")?;
    let filter = non_empty(args, "filter")?;

    let mut builder = StatementBuilder::new(format!("DELETE FROM {} WHERE ", table));
    builder.push_filter("filter", filter)?;
    Ok(finish_mutation(builder, args.flag("returning")))
}

// =============================================================================
// SCHEMA CHANGES
// =============================================================================

fn create_table_tool() -> ToolDefinition {
    ToolDefinition::new("create_table", "Create a table", Effect::Schema, create_table)
        .param(table_param())
        .param(ParamSpec::required(
            "columns",
            ParamKind::Sequence,
            "Column definitions: {name, type, primary_key?, not_null?, unique?}",
        ))
        .param(
            ParamSpec::optional("if_not_exists", ParamKind::Boolean, "Skip if the table exists")
                .with_default(json!(false)),
        )
}

const COLUMN_KEYS: [&str; 5] = ["name", "type", "primary_key", "not_null", "unique"];

fn column_definition(index: usize, value: &ArgValue) -> Result<(String, String), BindError> {
    let param = format!("columns[{}]", index);
    let spec = value.as_mapping().ok_or_else(|| BindError::TypeMismatch {
        name: param.clone(),
        expected: "a mapping",
        actual: value.kind(),
    })?;
    if let Some(unknown) = spec.keys().find(|k| !COLUMN_KEYS.contains(&k.as_str())) {
        return Err(BindError::malformed(param, format!("unknown key {:?}", unknown)));
    }

    let name = identifier(&format!("{}.name", param), field_text(spec, &param, "name")?)?;
    let mut sql = format!(
        "{} {}",
        quote_ident(name),
        column_type(&format!("{}.type", param), field_text(spec, &param, "type")?)?
    );
    if field_flag(spec, &param, "primary_key")? {
        sql.push_str(" PRIMARY KEY");
    }
    if field_flag(spec, &param, "not_null")? {
        sql.push_str(" NOT NULL");
    }
    if field_flag(spec, &param, "unique")? {
        sql.push_str(" UNIQUE");
    }
    Ok((name.to_string(), sql))
}

fn field_text<'a>(
    spec: &'a BTreeMap<String, ArgValue>,
    param: &str,
    key: &str,
) -> Result<&'a str, BindError> {
    match spec.get(key) {
        Some(ArgValue::String(s)) => Ok(s),
        Some(other) => Err(BindError::TypeMismatch {
            name: format!("{}.{}", param, key),
            expected: "a string",
            actual: other.kind(),
        }),
        None => Err(BindError::Missing(format!("{}.{}", param, key))),
    }
}

fn field_flag(spec: &BTreeMap<String, ArgValue>, param: &str, key: &str) -> Result<bool, BindError> {
    match spec.get(key) {
        None | Some(ArgValue::Null) => Ok(false),
        Some(ArgValue::Bool(b)) => Ok(*b),
        Some(other) => Err(BindError::TypeMismatch {
            name: format!("{}.{}", param, key),
            expected: "a boolean",
            actual: other.kind(),
        }),
    }
}

fn create_table(args: &BoundArgs, _: &BindLimits) -> Result<BoundStatement, BindError> {
    let table = args.table("table")?;
    let columns = args.sequence("columns")?;
    if columns.is_empty() {
        return Err(BindError::malformed("columns", "must not be empty"));
    }

    let mut seen = BTreeSet::new();
    let mut definitions = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let (name, sql) = column_definition(i, column)?;
        if !seen.insert(name.clone()) {
            return Err(BindError::malformed(
                "columns",
                format!("duplicate column {:?}", name),
            ));
        }
        definitions.push(sql);
    }

    let guard = if args.flag("if_not_exists") {
        "IF NOT EXISTS "
    } else {
        ""
    };
    let sql = format!("CREATE TABLE {}{} ({})", guard, table, definitions.join(", "));
    Ok(StatementBuilder::new(sql).finish(StatementKind::Command))
}

fn drop_table_tool() -> ToolDefinition {
    ToolDefinition::new("drop_table", "Drop a table", Effect::Schema, drop_table)
        .destructive()
        .param(table_param())
        .param(
            ParamSpec::optional("if_exists", ParamKind::Boolean, "Skip if the table is missing")
                .with_default(json!(false)),
        )
        .param(
            ParamSpec::optional("cascade", ParamKind::Boolean, "Also drop dependent objects")
                .with_default(json!(false)),
        )
}

fn drop_table(args: &BoundArgs, _: &BindLimits) -> Result<BoundStatement, BindError> {
    let table: QualifiedName = args.table("table")?;
    let mut sql = String::from("DROP TABLE ");
    if args.flag("if_exists") {
        sql.push_str("IF EXISTS ");
    }
    sql.push_str(&table.to_string());
    if args.flag("cascade") {
        sql.push_str(" CASCADE");
    }
    Ok(StatementBuilder::new(sql).finish(StatementKind::Command))
}
