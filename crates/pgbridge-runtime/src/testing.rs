//! Scripted in-memory connector for tests.
//!
//! Records every session operation in a shared journal and replays queued
//! execute results, so pool and dispatch behaviour can be asserted without a
//! database.

use crate::session::{Connector, Session};
use async_trait::async_trait;
use pgbridge_core::{
    BoundStatement, DbError, ErrorKind, QueryOutput, RowSet, StatementKind,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct ScriptState {
    journal: Mutex<Vec<String>>,
    results: Mutex<VecDeque<Result<QueryOutput, DbError>>>,
    connects: AtomicUsize,
    fail_connect: AtomicBool,
    fail_ping: AtomicBool,
    fail_rollback: AtomicBool,
    execute_delay_ms: AtomicU64,
}

impl ScriptState {
    fn record(&self, entry: impl Into<String>) {
        self.journal
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(entry.into());
    }
}

/// A [`Connector`] whose sessions follow a script.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<ScriptState>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `execute` on any session.
    ///
    /// With the queue empty, queries return an empty row set and commands
    /// report zero affected rows.
    pub fn push_result(&self, result: Result<QueryOutput, DbError>) {
        self.state
            .results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(result);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_ping(&self, fail: bool) {
        self.state.fail_ping.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_rollback(&self, fail: bool) {
        self.state.fail_rollback.store(fail, Ordering::SeqCst);
    }

    /// Make every `execute` sleep before answering.
    pub fn set_execute_delay(&self, delay: Duration) {
        self.state
            .execute_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of sessions opened so far.
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Every recorded operation, oldest first.
    pub fn journal(&self) -> Vec<String> {
        self.state
            .journal
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Operations other than `connect` and `close`.
    pub fn operations(&self) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter(|op| op != "connect" && op != "close")
            .collect()
    }

    pub fn clear_journal(&self) {
        self.state
            .journal
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, DbError> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(DbError::new(ErrorKind::Unavailable, "connection refused").fatal());
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.record("connect");
        Ok(Box::new(ScriptedSession {
            state: self.state.clone(),
        }))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

struct ScriptedSession {
    state: Arc<ScriptState>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn execute(&mut self, statement: &BoundStatement) -> Result<QueryOutput, DbError> {
        self.state.record(format!("execute: {}", statement.sql()));
        let delay = self.state.execute_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let queued = self
            .state
            .results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        match queued {
            Some(result) => result,
            None => Ok(match statement.kind() {
                StatementKind::Query => QueryOutput::Rows(RowSet::default()),
                StatementKind::Command => QueryOutput::Affected(0),
            }),
        }
    }

    async fn begin(&mut self) -> Result<(), DbError> {
        self.state.record("begin");
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.state.record("commit");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.state.record("rollback");
        if self.state.fail_rollback.load(Ordering::SeqCst) {
            return Err(DbError::new(ErrorKind::Internal, "rollback failed").fatal());
        }
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), DbError> {
        self.state.record("ping");
        if self.state.fail_ping.load(Ordering::SeqCst) {
            return Err(DbError::new(ErrorKind::Unavailable, "server closed the connection").fatal());
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.state.record("close");
    }
}
