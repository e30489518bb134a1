//! Shared test infrastructure for pgbridge end-to-end tests.
//!
//! This module provides:
//! - Docker container management for PostgreSQL
//! - Seed schema and data
//! - Dispatcher builders over a real `PgConnector`
//! - Helpers for asserting on call results

#![allow(dead_code)]

use pgbridge_adapter_pg::PgConnector;
use pgbridge_core::{
    CallResult, ConnectionPoolConfig, ErrorKind, GuardrailsConfig, McpConfig, Scalar,
    UpstreamConfig,
};
use pgbridge_mcp::{Dispatcher, McpServer, ToolRegistry};
use pgbridge_runtime::ConnectionPool;
use serde_json::Value;
use sqlx::PgPool;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// DOCKER CONTAINER CONFIGURATION
// =============================================================================

pub const CONTAINER_NAME: &str = "pgbridge_test_postgres";
pub const POSTGRES_PORT: u16 = 5433;
pub const POSTGRES_PASSWORD: &str = "pgbridge_test_password";
pub const DATABASE_NAME: &str = "pgbridge_test";

pub fn database_url() -> String {
    format!(
        "postgres://postgres:{}@localhost:{}/{}",
        POSTGRES_PASSWORD, POSTGRES_PORT, DATABASE_NAME
    )
}

// =============================================================================
// DOCKER CONTAINER MANAGEMENT
// =============================================================================

/// Start a PostgreSQL container for testing
pub fn start_postgres_container() -> Result<(), String> {
    let output = Command::new("docker")
        .args(["ps", "-a", "-q", "-f", &format!("name={}", CONTAINER_NAME)])
        .output()
        .map_err(|e| format!("Failed to check existing container: {}", e))?;

    if !String::from_utf8_lossy(&output.stdout).trim().is_empty() {
        let _ = Command::new("docker")
            .args(["rm", "-f", CONTAINER_NAME])
            .output();
    }

    let status = Command::new("docker")
        .args([
            "run",
            "-d",
            "--name",
            CONTAINER_NAME,
            "-e",
            &format!("POSTGRES_PASSWORD={}", POSTGRES_PASSWORD),
            "-e",
            &format!("POSTGRES_DB={}", DATABASE_NAME),
            "-p",
            &format!("{}:5432", POSTGRES_PORT),
            "postgres:16-alpine",
        ])
        .status()
        .map_err(|e| format!("Failed to start container: {}", e))?;

    if !status.success() {
        return Err("Failed to start PostgreSQL container".to_string());
    }
    Ok(())
}

/// Stop and remove the PostgreSQL container
pub fn stop_postgres_container() {
    let _ = Command::new("docker")
        .args(["rm", "-f", CONTAINER_NAME])
        .output();
}

/// Wait for PostgreSQL to be ready
pub async fn wait_for_postgres() -> Result<PgPool, String> {
    for attempt in 1..=30 {
        match PgPool::connect(&database_url()).await {
            Ok(pool) => {
                if sqlx::query("SELECT 1").fetch_one(&pool).await.is_ok() {
                    println!("✅ PostgreSQL ready after {} attempts", attempt);
                    return Ok(pool);
                }
            }
            Err(_) => {
                if attempt % 5 == 0 {
                    println!("⏳ Waiting for PostgreSQL... (attempt {})", attempt);
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    Err("PostgreSQL did not become ready in time".to_string())
}

// =============================================================================
// DATABASE INITIALIZATION
// =============================================================================

const SCHEMA_SQL: &str = r#"
CREATE TYPE customer_tier AS ENUM ('free', 'pro', 'enterprise');

CREATE TABLE customers (
    customer_id     serial PRIMARY KEY,
    email           text NOT NULL UNIQUE,
    name            text,
    tier            customer_tier NOT NULL DEFAULT 'free',
    lifetime_value  numeric(12, 2),
    external_id     uuid,
    signed_up       date,
    last_seen       timestamptz,
    tags            text[],
    meta            jsonb,
    active          boolean NOT NULL DEFAULT true
);

CREATE TABLE orders (
    order_id     serial PRIMARY KEY,
    customer_id  integer NOT NULL REFERENCES customers (customer_id),
    status       text NOT NULL,
    total        numeric(12, 2) NOT NULL
);

CREATE VIEW slow_view AS SELECT pg_sleep(1.5)::text AS slept;
"#;

const SEED_SQL: &str = r#"
INSERT INTO customers (email, name, tier, lifetime_value, external_id, signed_up, last_seen, tags, meta) VALUES
    ('ada@example.com',   'Ada',   'enterprise', 15000.50, 'a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11', '2024-01-15', '2025-03-01 12:00:00+00', '{vip,"early adopter"}', '{"plan": "annual"}'),
    ('grace@example.com', 'Grace', 'pro',        250.00,   NULL,                                   '2024-06-30', NULL,                     '{}',                   NULL),
    ('linus@example.com', NULL,    'free',       NULL,     NULL,                                   NULL,         NULL,                     NULL,                   NULL);

INSERT INTO orders (customer_id, status, total) VALUES
    (1, 'delivered', 1199.88),
    (1, 'pending',   35.00),
    (2, 'pending',   12.50);
"#;

pub async fn initialize_database(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    sqlx::raw_sql(SEED_SQL).execute(pool).await?;
    println!("✅ Database initialized with schema and seed data");
    Ok(())
}

// =============================================================================
// TEST CONTEXT
// =============================================================================

pub struct TestContext {
    /// Direct connection for fixtures and assertions.
    pub pool: PgPool,
}

impl TestContext {
    pub async fn setup() -> Result<Self, String> {
        start_postgres_container()?;
        let pool = wait_for_postgres().await?;
        initialize_database(&pool)
            .await
            .map_err(|e| format!("Failed to initialize database: {}", e))?;
        Ok(Self { pool })
    }

    /// A dispatcher with custom guardrails and pool bounds.
    pub fn dispatcher_with(
        &self,
        guardrails: GuardrailsConfig,
        pool: ConnectionPoolConfig,
    ) -> Dispatcher {
        let upstream = UpstreamConfig {
            database_url: Some(database_url()),
            pool,
            ..Default::default()
        };
        let connector = PgConnector::from_config(&upstream, guardrails.statement_timeout())
            .expect("test database url is valid");
        let pool = ConnectionPool::new(Arc::new(connector), &upstream.pool);
        let registry = Arc::new(ToolRegistry::with_builtins().expect("builtin catalog registers"));
        Dispatcher::new(registry, pool, &guardrails)
    }

    /// A dispatcher with default guardrails and a small pool.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher_with(
            GuardrailsConfig::default(),
            ConnectionPoolConfig {
                min_connections: 1,
                max_connections: 4,
                ..Default::default()
            },
        )
    }

    /// An MCP server over [`TestContext::dispatcher`].
    pub fn server(&self) -> McpServer {
        McpServer::new(McpConfig::default(), Arc::new(self.dispatcher()))
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT count(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .expect("count query")
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        stop_postgres_container();
        println!("🧹 Cleaned up PostgreSQL container");
    }
}

// =============================================================================
// RESULT HELPERS
// =============================================================================

/// The protocol envelope of a result.
pub fn envelope(result: &CallResult) -> Value {
    serde_json::to_value(result).expect("call result serializes")
}

/// Assert that a result is successful
pub fn assert_success(result: &CallResult, msg: &str) {
    assert!(result.is_ok(), "{}: {:?}", msg, result);
}

/// Assert that a result failed with the given kind
pub fn assert_error(result: &CallResult, kind: ErrorKind, msg: &str) {
    assert_eq!(result.error_kind(), Some(kind), "{}: {:?}", msg, result);
}

/// Error code (SQLSTATE) of a failed result
pub fn error_code(result: &CallResult) -> Option<String> {
    match result {
        CallResult::Error(e) => e.code.clone(),
        _ => None,
    }
}

/// Single cell of a row result
pub fn cell<'a>(result: &'a CallResult, row: usize, column: &str) -> &'a Scalar {
    result
        .rows()
        .and_then(|rows| rows.get(row, column))
        .unwrap_or_else(|| panic!("no cell {}[{}] in {:?}", column, row, result))
}

pub fn row_count(result: &CallResult) -> usize {
    result.rows().map(|r| r.len()).unwrap_or(0)
}
