//! Schema discovery tests: list_tables, describe_table and MCP resources.

use super::common::*;
use pgbridge_core::{ErrorKind, Scalar};
use pgbridge_mcp::JsonRpcRequest;
use serde_json::{Value, json};

pub async fn test_list_tables(ctx: &TestContext) {
    println!("  🧪 test_list_tables");

    let dispatcher = ctx.dispatcher();
    let result = dispatcher.call("list_tables", json!({})).await;
    assert_success(&result, "list_tables should succeed");

    let rows = result.rows().unwrap();
    assert_eq!(rows.columns, vec!["table_name", "table_type"]);
    let names: Vec<&Scalar> = (0..rows.len()).map(|i| rows.get(i, "table_name").unwrap()).collect();
    assert!(names.contains(&&Scalar::Text("customers".into())));
    assert!(names.contains(&&Scalar::Text("orders".into())));
    assert!(names.contains(&&Scalar::Text("slow_view".into())));

    let result = dispatcher.call("list_tables", json!({"schema": "no_such_schema"})).await;
    assert_success(&result, "unknown schema lists nothing");
    assert_eq!(row_count(&result), 0);

    println!("     ✓ Tables listed, empty schema yields no rows");
}

pub async fn test_describe_table(ctx: &TestContext) {
    println!("  🧪 test_describe_table");

    let dispatcher = ctx.dispatcher();
    let result = dispatcher.call("describe_table", json!({"table": "orders"})).await;
    assert_success(&result, "describe_table should succeed");

    assert_eq!(cell(&result, 0, "column_name"), &Scalar::Text("order_id".into()));
    assert_eq!(cell(&result, 0, "data_type"), &Scalar::Text("integer".into()));
    assert_eq!(cell(&result, 0, "nullable"), &Scalar::Bool(false));
    assert_eq!(cell(&result, 3, "column_name"), &Scalar::Text("total".into()));
    assert_eq!(cell(&result, 3, "column_default"), &Scalar::Null);

    let qualified = dispatcher
        .call("describe_table", json!({"table": "public.customers"}))
        .await;
    assert_eq!(row_count(&qualified), 11);

    let injected = dispatcher
        .call("describe_table", json!({"table": "orders; DROP TABLE orders"}))
        .await;
    assert_error(&injected, ErrorKind::InvalidArgument, "identifier is rejected");

    println!("     ✓ Columns in ordinal order with types and nullability");
}

pub async fn test_resources(ctx: &TestContext) {
    println!("  🧪 test_resources");

    let server = ctx.server();
    let read = |uri: &str| JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(json!(1)),
        method: "resources/read".to_string(),
        params: Some(json!({"uri": uri})),
    };

    let response = server.handle_request(read("postgres://tables")).await.unwrap();
    let text = response.result.unwrap()["contents"][0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    let envelope: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(envelope["ok"], true);

    let response = server
        .handle_request(read("postgres://schema/customers"))
        .await
        .unwrap();
    let text = response.result.unwrap()["contents"][0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    let envelope: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(envelope["rows"][0]["column_name"], "customer_id");

    let response = server.handle_request(read("postgres://data/orders")).await.unwrap();
    let text = response.result.unwrap()["contents"][0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    let envelope: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(envelope["rows"].as_array().unwrap().len(), 3);

    let response = server
        .handle_request(read("postgres://data/missing_table"))
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.data.unwrap()["error"]["code"], "42P01");

    println!("     ✓ Resources route through the dispatcher");
}

pub async fn run_all_tests(ctx: &TestContext) {
    println!("\n📂 Schema discovery");
    test_list_tables(ctx).await;
    test_describe_table(ctx).await;
    test_resources(ctx).await;
}
