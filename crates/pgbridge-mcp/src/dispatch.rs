//! Dispatch Core.
//!
//! Resolves a call against the registry, binds it, leases a connection,
//! executes (inside a transaction for mutating tools) and normalizes the
//! outcome into a [`CallResult`]. Every failure becomes an error result; the
//! lease is released on every path, including cancellation.

use crate::binder::{self, BindLimits};
use crate::tools::{Effect, ToolDefinition, ToolRegistry};
use pgbridge_core::{
    ArgValue, BoundStatement, CallResult, DbError, ErrorKind, GuardrailsConfig, QueryOutput,
};
use pgbridge_runtime::{ConnectionPool, PooledConnection};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Progress of one call, reported when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStage {
    Received,
    Resolved,
    Bound,
    Leased,
    Executed,
    Normalized,
}

/// Executes tool calls against the pool.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    pool: ConnectionPool,
    limits: BindLimits,
    call_timeout: Duration,
    max_affected_rows: u64,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        pool: ConnectionPool,
        guardrails: &GuardrailsConfig,
    ) -> Self {
        Self {
            registry,
            pool,
            limits: BindLimits::from(guardrails),
            call_timeout: guardrails.call_timeout(),
            max_affected_rows: guardrails.max_affected_rows,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn limits(&self) -> &BindLimits {
        &self.limits
    }

    /// Run a call under the default deadline.
    pub async fn call(&self, name: &str, arguments: Value) -> CallResult {
        let started = Instant::now();
        self.call_from(name, arguments, started, started + self.call_timeout)
            .await
    }

    /// Run a call that must finish, including the wait for a connection, by
    /// `deadline`.
    pub async fn call_with_deadline(
        &self,
        name: &str,
        arguments: Value,
        deadline: Instant,
    ) -> CallResult {
        self.call_from(name, arguments, Instant::now(), deadline)
            .await
    }

    async fn call_from(
        &self,
        name: &str,
        arguments: Value,
        started: Instant,
        deadline: Instant,
    ) -> CallResult {
        let call_id = Uuid::new_v4();
        let span = info_span!("tool_call", %call_id, tool = %name);
        self.run(name, arguments, started, deadline)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        name: &str,
        arguments: Value,
        started: Instant,
        deadline: Instant,
    ) -> CallResult {
        let mut stage = CallStage::Received;

        let Some(tool) = self.registry.resolve(name) else {
            return failed(
                stage,
                started,
                CallResult::error(ErrorKind::UnknownTool, format!("tool not found: {}", name)),
            );
        };
        stage = CallStage::Resolved;

        let arguments = match ArgValue::from(arguments) {
            ArgValue::Mapping(map) => map,
            ArgValue::Null => BTreeMap::new(),
            other => {
                return failed(
                    stage,
                    started,
                    CallResult::error(
                        ErrorKind::InvalidArgument,
                        format!("arguments must be an object, got {}", other.kind()),
                    ),
                );
            }
        };
        let statement = match binder::bind(tool, &arguments, &self.limits) {
            Ok(statement) => statement,
            Err(e) => {
                return failed(
                    stage,
                    started,
                    CallResult::error(ErrorKind::InvalidArgument, e.to_string()),
                );
            }
        };
        stage = CallStage::Bound;
        debug!(sql = %statement, mutating = tool.is_mutating(), "statement bound");

        let mut lease = match self.pool.acquire_from(started, deadline).await {
            Ok(lease) => lease,
            Err(e) => return failed(stage, started, DbError::from(e).into()),
        };
        stage = CallStage::Leased;

        let executed = timeout_at(deadline, self.execute(tool, &statement, &mut lease)).await;
        let output = match executed {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                drop(lease);
                return failed(stage, started, e.into());
            }
            Err(_) => {
                // the session is mid-statement; never hand it out again
                lease.mark_broken();
                drop(lease);
                return failed(
                    stage,
                    started,
                    CallResult::error(ErrorKind::Timeout, "call deadline exceeded during execution"),
                );
            }
        };
        stage = CallStage::Executed;
        debug!(stage = ?stage, "statement executed");
        drop(lease);

        let result = CallResult::from(output);
        stage = CallStage::Normalized;
        info!(
            stage = ?stage,
            elapsed_ms = started.elapsed().as_millis() as u64,
            rows = result.rows().map(|r| r.len()),
            "tool call completed"
        );
        result
    }

    async fn execute(
        &self,
        tool: &ToolDefinition,
        statement: &BoundStatement,
        lease: &mut PooledConnection,
    ) -> Result<QueryOutput, DbError> {
        if !tool.is_mutating() {
            return lease.execute(statement).await;
        }

        lease.begin().await?;
        let outcome = match lease.execute(statement).await {
            Ok(output) => self.check_affected(tool, &output).map(|()| output),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(output) => match lease.commit().await {
                Ok(()) => Ok(output),
                Err(e) => {
                    rollback(lease).await;
                    Err(e)
                }
            },
            Err(e) => {
                rollback(lease).await;
                Err(e)
            }
        }
    }

    fn check_affected(&self, tool: &ToolDefinition, output: &QueryOutput) -> Result<(), DbError> {
        if tool.effect != Effect::Data {
            return Ok(());
        }
        let affected = match output {
            QueryOutput::Affected(n) => *n,
            QueryOutput::Rows(rows) => rows.len() as u64,
        };
        if affected > self.max_affected_rows {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "{} would affect {} rows, above the limit of {}",
                    tool.name, affected, self.max_affected_rows
                ),
            ));
        }
        Ok(())
    }
}

/// A failed rollback leaves the lease marked broken, so the pool discards it.
async fn rollback(lease: &mut PooledConnection) {
    if let Err(e) = lease.rollback().await {
        warn!(error = %e, "rollback failed; discarding connection");
    }
}

fn failed(stage: CallStage, started: Instant, result: CallResult) -> CallResult {
    if let CallResult::Error(err) = &result {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match err.kind {
            ErrorKind::Internal | ErrorKind::Unavailable | ErrorKind::Timeout => warn!(
                stage = ?stage,
                kind = %err.kind,
                code = err.code.as_deref(),
                elapsed_ms,
                error = %err.message,
                "tool call failed"
            ),
            _ => info!(
                stage = ?stage,
                kind = %err.kind,
                code = err.code.as_deref(),
                elapsed_ms,
                error = %err.message,
                "tool call rejected"
            ),
        }
    }
    result
}
