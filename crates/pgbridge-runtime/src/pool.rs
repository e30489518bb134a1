//! Connection Pool Manager.
//!
//! A bounded set of sessions leased to one tool call at a time. A semaphore
//! bounds the number of live connections; idle connections sit in a deque
//! behind a short-held mutex that is never held across an await.
//!
//! Leases are RAII guards ([`PooledConnection`]). Dropping a lease returns the
//! session to the idle set, unless the session was marked broken or still has
//! a transaction open, in which case it is discarded and replaced lazily.

use crate::session::{Connector, Session};
use pgbridge_core::{BoundStatement, ConnectionPoolConfig, DbError, ErrorKind, QueryOutput};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

/// Errors returned by [`ConnectionPool::acquire`].
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("connection pool exhausted: no connection became free within {0:?}")]
    Exhausted(Duration),

    #[error("call deadline exceeded while waiting for a connection")]
    Timeout,

    #[error("connection pool is closed")]
    Closed,

    #[error("failed to open connection: {0}")]
    Connect(DbError),
}

impl PoolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::Exhausted(_) | PoolError::Closed => ErrorKind::Unavailable,
            PoolError::Timeout => ErrorKind::Timeout,
            PoolError::Connect(err) => err.kind,
        }
    }
}

impl From<PoolError> for DbError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Connect(err) => err,
            other => DbError::new(other.kind(), other.to_string()),
        }
    }
}

/// Pool sizing and timing, resolved from [`ConnectionPoolConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub min_connections: usize,
    pub max_connections: usize,
    pub acquire_timeout: Duration,
    /// Idle connections older than this are pinged before being leased.
    pub validation_interval: Duration,
}

impl From<&ConnectionPoolConfig> for PoolSettings {
    fn from(config: &ConnectionPoolConfig) -> Self {
        Self {
            min_connections: config.min_connections as usize,
            max_connections: config.max_connections.max(1) as usize,
            acquire_timeout: Duration::from_secs(config.acquire_timeout_seconds),
            validation_interval: Duration::from_secs(config.validation_interval_seconds),
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub max_connections: usize,
    pub live: usize,
    pub idle: usize,
    pub in_use: usize,
    pub acquired_total: u64,
    pub opened_total: u64,
    pub discarded_total: u64,
    pub closed: bool,
}

struct IdleConnection {
    session: Box<dyn Session>,
    last_validated: Instant,
    /// Returned while an operation was still in flight.
    suspect: bool,
}

impl IdleConnection {
    fn needs_validation(&self, interval: Duration) -> bool {
        self.suspect || self.last_validated.elapsed() >= interval
    }
}

struct PoolInner {
    connector: Arc<dyn Connector>,
    settings: PoolSettings,
    idle: Mutex<VecDeque<IdleConnection>>,
    permits: Arc<Semaphore>,
    live: AtomicUsize,
    acquired_total: AtomicU64,
    opened_total: AtomicU64,
    discarded_total: AtomicU64,
    closed: AtomicBool,
}

impl PoolInner {
    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleConnection>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn put_idle(&self, session: Box<dyn Session>, suspect: bool) {
        self.idle().push_back(IdleConnection {
            session,
            last_validated: Instant::now(),
            suspect,
        });
    }

    /// Drop a session from the pool, closing it in the background when a
    /// runtime is available.
    fn discard(&self, mut session: Box<dyn Session>, reason: &'static str) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.discarded_total.fetch_add(1, Ordering::Relaxed);
        debug!(reason, "discarding connection");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                session.close().await;
            });
        }
    }
}

/// Bounded pool of database sessions. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("settings", &self.inner.settings)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>, config: &ConnectionPoolConfig) -> Self {
        Self::with_settings(connector, PoolSettings::from(config))
    }

    pub fn with_settings(connector: Arc<dyn Connector>, settings: PoolSettings) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                settings,
                idle: Mutex::new(VecDeque::with_capacity(settings.max_connections)),
                permits: Arc::new(Semaphore::new(settings.max_connections)),
                live: AtomicUsize::new(0),
                acquired_total: AtomicU64::new(0),
                opened_total: AtomicU64::new(0),
                discarded_total: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn settings(&self) -> PoolSettings {
        self.inner.settings
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Open `min_connections` sessions up front.
    ///
    /// Returns the number of sessions opened. Any connect failure is returned
    /// so the caller can refuse to start.
    pub async fn warm_up(&self) -> Result<usize, PoolError> {
        let target = self.inner.settings.min_connections;
        let mut opened = 0;
        while self.inner.live.load(Ordering::SeqCst) < target {
            let deadline = Instant::now() + self.inner.settings.acquire_timeout;
            let permit = self.permit(deadline, false).await?;
            let session = self.open(deadline, false).await?;
            self.inner.put_idle(session, false);
            drop(permit);
            opened += 1;
        }
        info!(
            target = self.inner.settings.min_connections,
            opened,
            upstream = %self.inner.connector.describe(),
            "connection pool warmed up"
        );
        Ok(opened)
    }

    /// Lease a connection, waiting up to the pool's acquire timeout.
    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        let limit = Instant::now() + self.inner.settings.acquire_timeout;
        self.acquire_bounded(limit, false).await
    }

    /// Lease a connection, giving up at `deadline` or at the pool's acquire
    /// timeout, whichever comes first.
    pub async fn acquire_until(&self, deadline: Instant) -> Result<PooledConnection, PoolError> {
        self.acquire_from(Instant::now(), deadline).await
    }

    /// Like [`acquire_until`](Self::acquire_until), with the acquire timeout
    /// counted from `started` rather than from now.
    ///
    /// Hitting the caller's deadline strictly before the pool's bound yields
    /// [`PoolError::Timeout`]; otherwise a wait that runs out yields
    /// [`PoolError::Exhausted`]. A caller whose budget equals the acquire
    /// timeout, measured from the same instant, therefore sees `Exhausted`.
    pub async fn acquire_from(
        &self,
        started: Instant,
        deadline: Instant,
    ) -> Result<PooledConnection, PoolError> {
        let pool_deadline = started + self.inner.settings.acquire_timeout;
        if deadline < pool_deadline {
            self.acquire_bounded(deadline, true).await
        } else {
            self.acquire_bounded(pool_deadline, false).await
        }
    }

    async fn acquire_bounded(
        &self,
        limit: Instant,
        caller_bound: bool,
    ) -> Result<PooledConnection, PoolError> {
        if self.inner.is_closed() {
            return Err(PoolError::Closed);
        }
        let permit = self.permit(limit, caller_bound).await?;

        loop {
            let candidate = self.inner.idle().pop_back();
            let Some(mut idle) = candidate else {
                break;
            };
            if !idle.needs_validation(self.inner.settings.validation_interval) {
                return Ok(self.lease(idle.session, permit));
            }
            let pinged = timeout_at(limit, idle.session.ping()).await;
            match pinged {
                Ok(Ok(())) => return Ok(self.lease(idle.session, permit)),
                Ok(Err(err)) => {
                    warn!(error = %err, "idle connection failed validation");
                    self.inner.discard(idle.session, "validation failed");
                }
                Err(_) => {
                    self.inner.discard(idle.session, "validation timed out");
                    return Err(self.timeout_error(caller_bound));
                }
            }
        }

        let session = self.open(limit, caller_bound).await?;
        Ok(self.lease(session, permit))
    }

    /// Ping a leased connection. A failed ping marks the lease broken so the
    /// session is discarded on release.
    pub async fn validate(&self, lease: &mut PooledConnection) -> bool {
        match lease.ping().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "connection failed validation");
                lease.mark_broken();
                false
            }
        }
    }

    /// Close idle connections and reject further acquires. Leases still out
    /// are discarded when they are released.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.permits.close();
        let drained: Vec<IdleConnection> = self.inner.idle().drain(..).collect();
        let count = drained.len();
        for mut idle in drained {
            idle.session.close().await;
            self.inner.live.fetch_sub(1, Ordering::SeqCst);
        }
        info!(closed = count, "connection pool closed");
    }

    pub fn stats(&self) -> PoolStats {
        let live = self.inner.live.load(Ordering::SeqCst);
        let idle = self.inner.idle().len();
        PoolStats {
            max_connections: self.inner.settings.max_connections,
            live,
            idle,
            in_use: live.saturating_sub(idle),
            acquired_total: self.inner.acquired_total.load(Ordering::Relaxed),
            opened_total: self.inner.opened_total.load(Ordering::Relaxed),
            discarded_total: self.inner.discarded_total.load(Ordering::Relaxed),
            closed: self.inner.is_closed(),
        }
    }

    async fn permit(
        &self,
        limit: Instant,
        caller_bound: bool,
    ) -> Result<OwnedSemaphorePermit, PoolError> {
        match timeout_at(limit, self.inner.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(PoolError::Closed),
            Err(_) => Err(self.timeout_error(caller_bound)),
        }
    }

    async fn open(&self, limit: Instant, caller_bound: bool) -> Result<Box<dyn Session>, PoolError> {
        match timeout_at(limit, self.inner.connector.connect()).await {
            Ok(Ok(session)) => {
                self.inner.live.fetch_add(1, Ordering::SeqCst);
                self.inner.opened_total.fetch_add(1, Ordering::Relaxed);
                debug!(
                    live = self.inner.live.load(Ordering::SeqCst),
                    "opened connection"
                );
                Ok(session)
            }
            Ok(Err(err)) => {
                warn!(error = %err, "failed to open connection");
                Err(PoolError::Connect(err))
            }
            Err(_) => Err(self.timeout_error(caller_bound)),
        }
    }

    fn timeout_error(&self, caller_bound: bool) -> PoolError {
        if caller_bound {
            PoolError::Timeout
        } else {
            PoolError::Exhausted(self.inner.settings.acquire_timeout)
        }
    }

    fn lease(&self, session: Box<dyn Session>, permit: OwnedSemaphorePermit) -> PooledConnection {
        self.inner.acquired_total.fetch_add(1, Ordering::Relaxed);
        PooledConnection {
            session: Some(session),
            pool: self.inner.clone(),
            _permit: permit,
            broken: false,
            in_transaction: false,
            in_flight: false,
        }
    }
}

/// A leased session. Returned to the pool when dropped.
///
/// The lease tracks what its session is doing: a fatal error marks it broken,
/// `begin` marks a transaction open until `commit` or `rollback` succeeds, and
/// an operation whose future was dropped before completing leaves the session
/// suspect so it is pinged before reuse.
pub struct PooledConnection {
    session: Option<Box<dyn Session>>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
    broken: bool,
    in_transaction: bool,
    in_flight: bool,
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("broken", &self.broken)
            .field("in_transaction", &self.in_transaction)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl PooledConnection {
    pub async fn execute(&mut self, statement: &BoundStatement) -> Result<QueryOutput, DbError> {
        let session = self.session_mut()?;
        let result = session.execute(statement).await;
        self.settle(result)
    }

    pub async fn begin(&mut self) -> Result<(), DbError> {
        let session = self.session_mut()?;
        let result = session.begin().await;
        let result = self.settle(result);
        if result.is_ok() {
            self.in_transaction = true;
        }
        result
    }

    pub async fn commit(&mut self) -> Result<(), DbError> {
        let session = self.session_mut()?;
        let result = session.commit().await;
        let result = self.settle(result);
        if result.is_ok() {
            self.in_transaction = false;
        }
        result
    }

    /// Roll back the open transaction. A failed rollback marks the lease
    /// broken, since the session state is then unknown.
    pub async fn rollback(&mut self) -> Result<(), DbError> {
        let session = self.session_mut()?;
        let result = session.rollback().await;
        let result = self.settle(result);
        match result {
            Ok(()) => self.in_transaction = false,
            Err(_) => self.broken = true,
        }
        result
    }

    pub async fn ping(&mut self) -> Result<(), DbError> {
        let session = self.session_mut()?;
        let result = session.ping().await;
        self.settle(result)
    }

    /// Discard the session on release instead of returning it to the pool.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn session_mut(&mut self) -> Result<&mut Box<dyn Session>, DbError> {
        self.in_flight = true;
        self.session
            .as_mut()
            .ok_or_else(|| DbError::new(ErrorKind::Internal, "connection already released"))
    }

    fn settle<T>(&mut self, result: Result<T, DbError>) -> Result<T, DbError> {
        self.in_flight = false;
        if let Err(err) = &result
            && err.fatal
        {
            self.broken = true;
        }
        result
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if self.broken {
            self.pool.discard(session, "broken");
        } else if self.in_transaction {
            self.pool.discard(session, "released inside a transaction");
        } else if self.pool.is_closed() {
            self.pool.discard(session, "pool closed");
        } else {
            self.pool.put_idle(session, self.in_flight);
        }
        // the permit is released after the session is back in the idle set
    }
}
