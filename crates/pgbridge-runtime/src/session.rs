//! Database session traits.
//!
//! Adapters implement [`Connector`] to open sessions and [`Session`] to run
//! bound statements on one. Every failure leaves a session as a [`DbError`]
//! that already carries its [`pgbridge_core::ErrorKind`].

use async_trait::async_trait;
use pgbridge_core::{BoundStatement, DbError, QueryOutput};

/// One live database connection.
#[async_trait]
pub trait Session: Send {
    /// Execute a bound statement.
    ///
    /// [`pgbridge_core::StatementKind::Query`] statements return rows,
    /// commands return the affected row count.
    async fn execute(&mut self, statement: &BoundStatement) -> Result<QueryOutput, DbError>;

    async fn begin(&mut self) -> Result<(), DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    async fn rollback(&mut self) -> Result<(), DbError>;

    /// Round-trip to the server to check the connection is usable.
    async fn ping(&mut self) -> Result<(), DbError>;

    /// Close the connection gracefully. The session is unusable afterwards.
    async fn close(&mut self);
}

/// Opens new sessions for the pool.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Session>, DbError>;

    /// Short description of the target, safe to log.
    fn describe(&self) -> String {
        "database".to_string()
    }
}
