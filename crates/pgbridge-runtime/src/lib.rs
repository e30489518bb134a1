//! # pgbridge-runtime
//!
//! The database-facing seams of pgbridge: the [`Session`] and [`Connector`]
//! traits implemented by adapters, and the [`ConnectionPool`] that leases
//! sessions to tool calls.

pub mod pool;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use pool::{ConnectionPool, PoolError, PoolStats, PooledConnection};
pub use session::{Connector, Session};
