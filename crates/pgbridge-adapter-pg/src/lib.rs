//! # pgbridge-adapter-pg
//!
//! PostgreSQL implementation of the pgbridge [`Connector`] and [`Session`]
//! traits, built on a single `sqlx::PgConnection` per session.
//!
//! Statements are never cached on the connection (`persistent(false)`): the
//! parameter types may differ between two calls with the same SQL text.

pub mod classify;
mod encode;
pub mod normalize;

use async_trait::async_trait;
use pgbridge_core::{
    BoundStatement, DbError, ErrorKind, QueryOutput, SslMode, StatementKind, UpstreamConfig,
};
use pgbridge_runtime::{Connector, Session};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{Connection, Executor};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub use classify::{classify_sqlstate, db_error};

const APPLICATION_NAME: &str = "pgbridge";

fn ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Allow => PgSslMode::Allow,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

/// Opens [`PgSession`]s against one upstream.
#[derive(Debug, Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
    target: String,
}

impl PgConnector {
    /// Build connect options from configuration.
    ///
    /// Every session carries `statement_timeout` as a server-side limit.
    pub fn from_config(
        config: &UpstreamConfig,
        statement_timeout: Duration,
    ) -> Result<Self, DbError> {
        let options = match config.resolved_url() {
            Some(url) => PgConnectOptions::from_str(&url).map_err(|e| {
                DbError::new(
                    ErrorKind::InvalidArgument,
                    format!("invalid database url: {}", e),
                )
            })?,
            None => {
                let mut options = PgConnectOptions::new()
                    .host(&config.host)
                    .port(config.port)
                    .database(&config.database)
                    .username(&config.username)
                    .ssl_mode(ssl_mode(config.ssl_mode));
                if let Some(password) = config.get_password() {
                    options = options.password(&password);
                }
                options
            }
        };
        let options = options
            .application_name(APPLICATION_NAME)
            .options([(
                "statement_timeout",
                statement_timeout.as_millis().to_string(),
            )]);

        Ok(Self {
            options,
            target: config.redacted(),
        })
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, DbError> {
        let conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(|e| {
                // any failure to establish a session means the upstream is unreachable
                let mut err = db_error(e);
                err.kind = ErrorKind::Unavailable;
                err
            })?;
        debug!(target_db = %self.target, "postgres session established");
        Ok(Box::new(PgSession::new(conn)))
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}

/// One Postgres connection.
pub struct PgSession {
    conn: Option<PgConnection>,
}

impl PgSession {
    pub fn new(conn: PgConnection) -> Self {
        Self { conn: Some(conn) }
    }

    fn conn(&mut self) -> Result<&mut PgConnection, DbError> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::new(ErrorKind::Internal, "session already closed").fatal())
    }

    async fn simple(&mut self, sql: &'static str) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(sql).await.map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl Session for PgSession {
    async fn execute(&mut self, statement: &BoundStatement) -> Result<QueryOutput, DbError> {
        let conn = self.conn()?;
        let args = encode::arguments(conn, statement).await?;
        let query = sqlx::query_with(statement.sql(), args).persistent(false);

        match statement.kind() {
            StatementKind::Query => {
                let rows = query.fetch_all(&mut *conn).await.map_err(db_error)?;
                let columns = match rows.first() {
                    Some(row) => normalize::column_names(sqlx::Row::columns(row)),
                    None => {
                        // no row to read column names from
                        let described = (&mut *conn)
                            .describe(statement.sql())
                            .await
                            .map_err(db_error)?;
                        normalize::column_names(described.columns())
                    }
                };
                let set = normalize::row_set(columns, &rows).map_err(db_error)?;
                Ok(QueryOutput::Rows(set))
            }
            StatementKind::Command => {
                let done = query.execute(&mut *conn).await.map_err(db_error)?;
                Ok(QueryOutput::Affected(done.rows_affected()))
            }
        }
    }

    async fn begin(&mut self) -> Result<(), DbError> {
        self.simple("BEGIN").await
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.simple("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.simple("ROLLBACK").await
    }

    async fn ping(&mut self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.ping().await.map_err(db_error)
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take()
            && let Err(e) = conn.close().await
        {
            debug!(error = %e, "error closing postgres session");
        }
    }
}
