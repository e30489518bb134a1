//! Concurrency tests: pool bounds under load, caller deadlines and the
//! server-side statement timeout.

use super::common::*;
use futures::future::join_all;
use pgbridge_core::{ConnectionPoolConfig, ErrorKind, GuardrailsConfig};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

pub async fn test_bounded_pool_under_load(ctx: &TestContext) {
    println!("  🧪 test_bounded_pool_under_load");

    let dispatcher = ctx.dispatcher_with(
        GuardrailsConfig::default(),
        ConnectionPoolConfig {
            min_connections: 0,
            max_connections: 2,
            acquire_timeout_seconds: 1,
            ..Default::default()
        },
    );

    let calls = (0..3).map(|_| dispatcher.call("select", json!({"table": "slow_view"})));
    let results = tokio::time::timeout(Duration::from_secs(10), join_all(calls))
        .await
        .expect("calls must not deadlock");

    let ok = results.iter().filter(|r| r.is_ok()).count();
    for result in &results {
        assert!(
            result.is_ok() || result.error_kind() == Some(ErrorKind::Unavailable),
            "unexpected outcome: {:?}",
            result
        );
    }
    assert!(ok >= 2, "both connections should serve a call");

    let stats = dispatcher.pool().stats();
    assert!(stats.live <= 2);
    assert_eq!(stats.in_use, 0);

    println!("     ✓ {} of 3 calls served with 2 connections, the rest Unavailable", ok);
}

pub async fn test_statement_timeout(ctx: &TestContext) {
    println!("  🧪 test_statement_timeout");

    let dispatcher = ctx.dispatcher_with(
        GuardrailsConfig {
            statement_timeout_seconds: 1,
            ..Default::default()
        },
        ConnectionPoolConfig {
            min_connections: 0,
            max_connections: 1,
            ..Default::default()
        },
    );

    let result = dispatcher.call("select", json!({"table": "slow_view"})).await;
    assert_error(&result, ErrorKind::Timeout, "statement timeout");
    assert_eq!(error_code(&result).as_deref(), Some("57014"));

    // a cancelled statement leaves the session usable
    let next = dispatcher.call("select", json!({"table": "orders", "limit": 1})).await;
    assert_success(&next, "connection reusable after cancel");
    assert_eq!(dispatcher.pool().stats().discarded_total, 0);

    println!("     ✓ Server-side timeout is Timeout (57014)");
}

pub async fn test_call_deadline(ctx: &TestContext) {
    println!("  🧪 test_call_deadline");

    let dispatcher = ctx.dispatcher();
    let deadline = Instant::now() + Duration::from_millis(200);
    let result = dispatcher
        .call_with_deadline("select", json!({"table": "slow_view"}), deadline)
        .await;
    assert_error(&result, ErrorKind::Timeout, "caller deadline");

    let stats = dispatcher.pool().stats();
    assert_eq!(stats.discarded_total, 1, "interrupted session is not reused");
    assert_eq!(stats.in_use, 0);

    let next = dispatcher.call("list_tables", json!({})).await;
    assert_success(&next, "pool recovers with a fresh connection");

    println!("     ✓ Deadline enforced, session discarded");
}

pub async fn run_all_tests(ctx: &TestContext) {
    println!("\n⚡ Concurrency");
    test_bounded_pool_under_load(ctx).await;
    test_statement_timeout(ctx).await;
    test_call_deadline(ctx).await;
}
