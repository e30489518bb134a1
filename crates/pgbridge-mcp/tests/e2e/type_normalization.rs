//! Type normalization tests: how Postgres values come back as scalars and
//! how string arguments reach typed columns.

use super::common::*;
use pgbridge_core::{ErrorKind, Scalar};
use serde_json::json;

const ADA_UUID: &str = "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11";

fn text(value: &str) -> Scalar {
    Scalar::Text(value.to_string())
}

pub async fn test_scalar_shapes(ctx: &TestContext) {
    println!("  🧪 test_scalar_shapes");

    let dispatcher = ctx.dispatcher();
    let result = dispatcher
        .call("select", json!({"table": "customers", "filter": {"email": "ada@example.com"}}))
        .await;
    assert_success(&result, "select ada");

    assert_eq!(cell(&result, 0, "customer_id"), &Scalar::Int(1));
    assert_eq!(cell(&result, 0, "lifetime_value"), &Scalar::Float(15000.5));
    assert_eq!(cell(&result, 0, "external_id"), &text(ADA_UUID));
    assert_eq!(cell(&result, 0, "signed_up"), &text("2024-01-15"));
    assert_eq!(cell(&result, 0, "last_seen"), &text("2025-03-01T12:00:00+00:00"));
    assert_eq!(cell(&result, 0, "tags"), &text(r#"{vip,"early adopter"}"#));
    assert_eq!(cell(&result, 0, "meta"), &text(r#"{"plan":"annual"}"#));
    assert_eq!(cell(&result, 0, "tier"), &text("enterprise"));
    assert_eq!(cell(&result, 0, "active"), &Scalar::Bool(true));

    let grace = dispatcher
        .call("select", json!({"table": "customers", "filter": {"email": "grace@example.com"}}))
        .await;
    assert_eq!(cell(&grace, 0, "lifetime_value"), &Scalar::Int(250));
    assert_eq!(cell(&grace, 0, "tags"), &text("{}"));
    assert_eq!(cell(&grace, 0, "external_id"), &Scalar::Null);

    println!("     ✓ numeric, uuid, date, timestamptz, arrays, jsonb, enum, bool");
}

pub async fn test_string_arguments_reach_typed_columns(ctx: &TestContext) {
    println!("  🧪 test_string_arguments_reach_typed_columns");

    let dispatcher = ctx.dispatcher();
    let by_uuid = dispatcher
        .call("select", json!({"table": "customers", "filter": {"external_id": ADA_UUID}}))
        .await;
    assert_eq!(row_count(&by_uuid), 1);
    assert_eq!(cell(&by_uuid, 0, "name"), &text("Ada"));

    let inserted = dispatcher
        .call(
            "insert",
            json!({
                "table": "customers",
                "values": {
                    "email": "margaret@example.com",
                    "name": "Margaret",
                    "tier": "pro",
                    "signed_up": "2025-02-02",
                    "last_seen": "2025-02-02T08:30:00Z",
                    "lifetime_value": "99.95",
                    "external_id": "6f1c2a3e-5b4d-4c7e-9f8a-0b1c2d3e4f50",
                    "tags": ["apollo", "guidance"],
                    "meta": {"team": "software"}
                },
                "returning": true
            }),
        )
        .await;
    assert_success(&inserted, "typed insert from strings");
    assert_eq!(cell(&inserted, 0, "tier"), &text("pro"));
    assert_eq!(cell(&inserted, 0, "signed_up"), &text("2025-02-02"));
    assert_eq!(cell(&inserted, 0, "last_seen"), &text("2025-02-02T08:30:00+00:00"));
    assert_eq!(cell(&inserted, 0, "lifetime_value"), &Scalar::Float(99.95));
    assert_eq!(cell(&inserted, 0, "tags"), &text("{apollo,guidance}"));
    assert_eq!(cell(&inserted, 0, "meta"), &text(r#"{"team":"software"}"#));

    let by_enum = dispatcher
        .call(
            "select",
            json!({"table": "customers", "columns": ["email"], "filter": {"tier": "pro"}}),
        )
        .await;
    assert_eq!(row_count(&by_enum), 2);

    println!("     ✓ uuid, enum, date, timestamptz, numeric, array and jsonb from JSON arguments");
}

pub async fn test_malformed_typed_values(ctx: &TestContext) {
    println!("  🧪 test_malformed_typed_values");

    let dispatcher = ctx.dispatcher();
    let bad_uuid = dispatcher
        .call("select", json!({"table": "customers", "filter": {"external_id": "not-a-uuid"}}))
        .await;
    assert_error(&bad_uuid, ErrorKind::InvalidArgument, "bad uuid");

    let bad_date = dispatcher
        .call(
            "insert",
            json!({"table": "customers", "values": {"email": "x@example.com", "signed_up": "yesterday"}}),
        )
        .await;
    assert_error(&bad_date, ErrorKind::InvalidArgument, "bad date");

    let bad_enum = dispatcher
        .call(
            "insert",
            json!({"table": "customers", "values": {"email": "y@example.com", "tier": "platinum"}}),
        )
        .await;
    assert_error(&bad_enum, ErrorKind::InvalidArgument, "unknown enum label");
    assert_eq!(error_code(&bad_enum).as_deref(), Some("22P02"));

    println!("     ✓ Unparsable values are InvalidArgument");
}

pub async fn test_array_and_char_columns(ctx: &TestContext) {
    println!("  🧪 test_array_and_char_columns");

    for statement in [
        r#"CREATE TABLE readings (
            id int PRIMARY KEY,
            kind "char",
            weights real[],
            prices numeric[],
            days date[],
            seen timestamptz[],
            docs jsonb[]
        )"#,
        r#"INSERT INTO readings VALUES (
            1,
            'r',
            '{1.5,2.25}',
            '{19.99,NULL,3}',
            '{2025-01-01,2025-02-14}',
            '{"2025-03-01 12:00:00+00"}',
            ARRAY['{"a":1}'::jsonb]
        )"#,
    ] {
        sqlx::query(statement)
            .execute(&ctx.pool)
            .await
            .expect("readings fixture");
    }

    let dispatcher = ctx.dispatcher();
    let result = dispatcher.call("select", json!({"table": "readings"})).await;
    assert_success(&result, "select readings");
    assert_eq!(cell(&result, 0, "kind"), &text("r"));
    assert_eq!(cell(&result, 0, "weights"), &text("{1.5,2.25}"));
    assert_eq!(cell(&result, 0, "prices"), &text("{19.99,NULL,3}"));
    assert_eq!(cell(&result, 0, "days"), &text("{2025-01-01,2025-02-14}"));
    assert_eq!(cell(&result, 0, "seen"), &text("{2025-03-01T12:00:00+00:00}"));
    assert_eq!(cell(&result, 0, "docs"), &text(r#"{"{\"a\":1}"}"#));

    let inserted = dispatcher
        .call(
            "insert",
            json!({"table": "readings", "values": {"id": 2, "weights": [0.5, 4]}, "returning": true}),
        )
        .await;
    assert_success(&inserted, "real[] from a JSON array");
    assert_eq!(cell(&inserted, 0, "weights"), &text("{0.5,4}"));

    sqlx::query("DROP TABLE readings")
        .execute(&ctx.pool)
        .await
        .expect("drop readings");

    println!("     ✓ real[], numeric[], date[], timestamptz[], jsonb[] and \"char\" decode");
}

pub async fn run_all_tests(ctx: &TestContext) {
    println!("\n🔢 Type normalization");
    test_scalar_shapes(ctx).await;
    test_string_arguments_reach_typed_columns(ctx).await;
    test_malformed_typed_values(ctx).await;
    test_array_and_char_columns(ctx).await;
}
