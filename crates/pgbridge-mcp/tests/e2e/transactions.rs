//! Transaction tests: rollback on failure, the affected-rows guardrail and
//! SQLSTATE classification.

use super::common::*;
use pgbridge_adapter_pg::PgConnector;
use pgbridge_core::{
    BoundStatement, ConnectionPoolConfig, ErrorKind, GuardrailsConfig, StatementKind,
    UpstreamConfig,
};
use pgbridge_runtime::Connector;
use serde_json::json;
use std::time::Duration;

pub async fn test_constraint_violation_rolls_back(ctx: &TestContext) {
    println!("  🧪 test_constraint_violation_rolls_back");

    let before = ctx.count("customers").await;
    let dispatcher = ctx.dispatcher();
    let result = dispatcher
        .call(
            "insert",
            json!({"table": "customers", "values": {"email": "ada@example.com", "name": "Imposter"}}),
        )
        .await;
    assert_error(&result, ErrorKind::Conflict, "duplicate email");
    assert_eq!(error_code(&result).as_deref(), Some("23505"));
    assert_eq!(ctx.count("customers").await, before);

    let orphan = dispatcher
        .call(
            "insert",
            json!({"table": "orders", "values": {"customer_id": 999, "status": "new", "total": 1}}),
        )
        .await;
    assert_error(&orphan, ErrorKind::Conflict, "foreign key");
    assert_eq!(error_code(&orphan).as_deref(), Some("23503"));

    // the connection went back to the pool clean
    let next = dispatcher.call("select", json!({"table": "orders", "limit": 1})).await;
    assert_success(&next, "pool usable after rollback");

    println!("     ✓ Conflict reported, nothing written");
}

pub async fn test_affected_rows_guardrail(ctx: &TestContext) {
    println!("  🧪 test_affected_rows_guardrail");

    let dispatcher = ctx.dispatcher_with(
        GuardrailsConfig {
            max_affected_rows: 1,
            ..Default::default()
        },
        ConnectionPoolConfig {
            min_connections: 0,
            max_connections: 2,
            ..Default::default()
        },
    );

    let result = dispatcher
        .call(
            "update",
            json!({"table": "customers", "values": {"active": false}, "filter": {"active": true}}),
        )
        .await;
    assert_error(&result, ErrorKind::InvalidArgument, "too many rows");

    let deactivated: i64 =
        sqlx::query_scalar("SELECT count(*) FROM customers WHERE active = false")
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(deactivated, 0, "update must be rolled back");

    let single = dispatcher
        .call(
            "update",
            json!({"table": "customers", "values": {"name": "Linus T"}, "filter": {"email": "linus@example.com"}}),
        )
        .await;
    assert_success(&single, "one row is within the limit");

    println!("     ✓ Over-limit update rolled back, single-row update allowed");
}

pub async fn test_sqlstate_classification(ctx: &TestContext) {
    println!("  🧪 test_sqlstate_classification");

    let dispatcher = ctx.dispatcher();
    let missing = dispatcher.call("select", json!({"table": "no_such_table"})).await;
    assert_error(&missing, ErrorKind::InvalidArgument, "undefined table");
    assert_eq!(error_code(&missing).as_deref(), Some("42P01"));

    let column = dispatcher
        .call("select", json!({"table": "orders", "columns": ["nope"]}))
        .await;
    assert_error(&column, ErrorKind::InvalidArgument, "undefined column");
    assert_eq!(error_code(&column).as_deref(), Some("42703"));

    println!("     ✓ Class 42 maps to InvalidArgument with its SQLSTATE");
}

pub async fn test_rejected_calls_never_lease(ctx: &TestContext) {
    println!("  🧪 test_rejected_calls_never_lease");

    let dispatcher = ctx.dispatcher();
    let unknown = dispatcher.call("truncate", json!({"table": "orders"})).await;
    assert_error(&unknown, ErrorKind::UnknownTool, "unknown tool");

    let missing = dispatcher.call("insert", json!({"values": {"a": 1}})).await;
    assert_error(&missing, ErrorKind::InvalidArgument, "missing table");

    let injected = dispatcher
        .call("select", json!({"table": "orders", "columns": ["total; DELETE FROM orders"]}))
        .await;
    assert_error(&injected, ErrorKind::InvalidArgument, "hostile identifier");

    assert_eq!(dispatcher.pool().stats().acquired_total, 0);
    assert_eq!(ctx.count("orders").await, 2);

    println!("     ✓ Resolution and binding failures touch no connection");
}

pub async fn test_session_transaction_control(ctx: &TestContext) {
    println!("  🧪 test_session_transaction_control");

    let upstream = UpstreamConfig {
        database_url: Some(database_url()),
        ..Default::default()
    };
    let connector =
        PgConnector::from_config(&upstream, Duration::from_secs(5)).expect("connector");
    let mut session = connector.connect().await.expect("session");
    let draft = BoundStatement::new(
        "INSERT INTO orders (customer_id, status, total) VALUES (1, 'draft', 5)",
        Vec::new(),
        StatementKind::Command,
    );
    let before = ctx.count("orders").await;

    session.begin().await.expect("begin");
    session.execute(&draft).await.expect("insert draft");
    session.rollback().await.expect("rollback");
    assert_eq!(ctx.count("orders").await, before);

    session.begin().await.expect("begin");
    session.execute(&draft).await.expect("insert draft");
    session.commit().await.expect("commit");
    assert_eq!(ctx.count("orders").await, before + 1);

    session.ping().await.expect("ping after commit");
    session.close().await;

    sqlx::query("DELETE FROM orders WHERE status = 'draft'")
        .execute(&ctx.pool)
        .await
        .expect("remove draft");

    println!("     ✓ BEGIN/ROLLBACK/COMMIT on a raw session");
}

pub async fn run_all_tests(ctx: &TestContext) {
    println!("\n🔁 Transactions");
    test_constraint_violation_rolls_back(ctx).await;
    test_affected_rows_guardrail(ctx).await;
    test_sqlstate_classification(ctx).await;
    test_rejected_calls_never_lease(ctx).await;
    test_session_transaction_control(ctx).await;
}
