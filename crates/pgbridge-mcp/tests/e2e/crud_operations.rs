//! CRUD round trips through the built-in tools.

use super::common::*;
use pgbridge_core::{CallResult, ErrorKind, Scalar};
use serde_json::json;

pub async fn test_notes_round_trip(ctx: &TestContext) {
    println!("  🧪 test_notes_round_trip");

    let dispatcher = ctx.dispatcher();
    let created = dispatcher
        .call(
            "create_table",
            json!({
                "table": "notes",
                "columns": [
                    {"name": "id", "type": "integer"},
                    {"name": "body", "type": "text"}
                ]
            }),
        )
        .await;
    assert_success(&created, "create_table should succeed");

    let inserted = dispatcher
        .call("insert", json!({"table": "notes", "values": {"id": 1, "body": "hello"}}))
        .await;
    assert_eq!(inserted, CallResult::Affected { count: 1 });

    let selected = dispatcher
        .call("select", json!({"table": "notes", "filter": {"id": 1}}))
        .await;
    assert_eq!(
        envelope(&selected),
        json!({"ok": true, "columns": ["id", "body"], "rows": [{"id": 1, "body": "hello"}]})
    );

    let dropped = dispatcher.call("drop_table", json!({"table": "notes"})).await;
    assert_success(&dropped, "drop_table should succeed");
    let again = dispatcher.call("drop_table", json!({"table": "notes"})).await;
    assert_error(&again, ErrorKind::InvalidArgument, "dropping a missing table");
    let tolerant = dispatcher
        .call("drop_table", json!({"table": "notes", "if_exists": true}))
        .await;
    assert_success(&tolerant, "if_exists tolerates a missing table");

    println!("     ✓ create → insert → select → drop");
}

pub async fn test_insert_then_select_one_row(ctx: &TestContext) {
    println!("  🧪 test_insert_then_select_one_row");

    let dispatcher = ctx.dispatcher();
    let inserted = dispatcher
        .call(
            "insert",
            json!({
                "table": "customers",
                "values": {"email": "barbara@example.com", "name": "Barbara"},
                "returning": true
            }),
        )
        .await;
    assert_success(&inserted, "insert returning");
    assert_eq!(row_count(&inserted), 1);
    assert_eq!(cell(&inserted, 0, "tier"), &Scalar::Text("free".into()));

    let selected = dispatcher
        .call(
            "select",
            json!({
                "table": "customers",
                "columns": ["email", "name"],
                "filter": {"email": "barbara@example.com"}
            }),
        )
        .await;
    assert_eq!(row_count(&selected), 1);
    assert_eq!(cell(&selected, 0, "name"), &Scalar::Text("Barbara".into()));

    println!("     ✓ Exactly one matching row");
}

pub async fn test_select_order_and_limit(ctx: &TestContext) {
    println!("  🧪 test_select_order_and_limit");

    let dispatcher = ctx.dispatcher();
    let result = dispatcher
        .call(
            "select",
            json!({"table": "orders", "order_by": ["total desc"], "limit": 2}),
        )
        .await;
    assert_success(&result, "ordered select");
    assert_eq!(row_count(&result), 2);
    assert_eq!(cell(&result, 0, "order_id"), &Scalar::Int(1));
    assert_eq!(cell(&result, 1, "order_id"), &Scalar::Int(2));

    let nulls = dispatcher
        .call("select", json!({"table": "customers", "filter": {"name": null}}))
        .await;
    assert_eq!(row_count(&nulls), 1);
    assert_eq!(cell(&nulls, 0, "email"), &Scalar::Text("linus@example.com".into()));

    let empty = dispatcher
        .call("select", json!({"table": "orders", "filter": {"status": "cancelled"}}))
        .await;
    assert_success(&empty, "no matches is still ok");
    assert_eq!(
        empty.rows().unwrap().columns,
        vec!["order_id", "customer_id", "status", "total"]
    );

    println!("     ✓ Ordering, limit, IS NULL filter, column names on empty results");
}

pub async fn test_update_and_delete(ctx: &TestContext) {
    println!("  🧪 test_update_and_delete");

    let dispatcher = ctx.dispatcher();
    let updated = dispatcher
        .call(
            "update",
            json!({
                "table": "orders",
                "values": {"status": "shipped"},
                "filter": {"status": "pending", "customer_id": 2},
                "returning": true
            }),
        )
        .await;
    assert_success(&updated, "update returning");
    assert_eq!(row_count(&updated), 1);
    assert_eq!(cell(&updated, 0, "status"), &Scalar::Text("shipped".into()));

    let deleted = dispatcher
        .call("delete", json!({"table": "orders", "filter": {"order_id": 3}}))
        .await;
    assert_eq!(deleted, CallResult::Affected { count: 1 });
    assert_eq!(ctx.count("orders").await, 2);

    let unfiltered = dispatcher.call("delete", json!({"table": "orders", "filter": {}})).await;
    assert_error(&unfiltered, ErrorKind::InvalidArgument, "empty filter rejected");
    assert_eq!(ctx.count("orders").await, 2);

    println!("     ✓ Update returning, delete count, empty filter refused");
}

pub async fn test_injection_is_inert(ctx: &TestContext) {
    println!("  🧪 test_injection_is_inert");

    let dispatcher = ctx.dispatcher();
    let payload = "a'); DROP TABLE customers;--";
    let inserted = dispatcher
        .call(
            "insert",
            json!({"table": "customers", "values": {"email": payload, "name": payload}}),
        )
        .await;
    assert_success(&inserted, "hostile text is stored as data");

    let selected = dispatcher
        .call("select", json!({"table": "customers", "filter": {"email": payload}}))
        .await;
    assert_eq!(cell(&selected, 0, "name"), &Scalar::Text(payload.into()));
    assert!(ctx.count("customers").await >= 4);

    println!("     ✓ Metacharacters round-trip verbatim");
}

pub async fn run_all_tests(ctx: &TestContext) {
    println!("\n🗃️  CRUD operations");
    test_notes_round_trip(ctx).await;
    test_insert_then_select_one_row(ctx).await;
    test_select_order_and_limit(ctx).await;
    test_update_and_delete(ctx).await;
    test_injection_is_inert(ctx).await;
}
