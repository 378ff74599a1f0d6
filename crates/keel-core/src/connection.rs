//! Database connection traits.
//!
//! - [`Connection`] - executes parameterized statements
//! - [`ConnectionProvider`] - hands out connections on demand and takes them back
//! - [`Lease`] - guard that returns a connection to its provider when dropped
//!
//! All operations integrate with asupersync's structured concurrency via `Cx` context
//! for proper cancellation and timeout handling.

use crate::dialect::Dialect;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;
use std::ops::Deref;

/// A database connection.
///
/// Statements are always sent with bound parameters; placeholders follow
/// [`Connection::dialect`].
pub trait Connection: Send + Sync {
    /// The SQL dialect spoken by this connection.
    fn dialect(&self) -> Dialect;

    /// Execute a query and return the first row, if any.
    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, crate::Error>> + Send;

    /// Execute a statement and return the number of rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Check that the connection is still usable.
    fn ping(&self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send;

    /// Check if the connection is valid, swallowing the failure detail.
    fn is_valid(&self, cx: &Cx) -> impl Future<Output = bool> + Send {
        async {
            match self.ping(cx).await {
                Outcome::Ok(()) => true,
                Outcome::Err(_) | Outcome::Cancelled(_) | Outcome::Panicked(_) => false,
            }
        }
    }
}

/// Source of connections for sessions.
///
/// `acquire` may open a fresh connection or hand out a pooled one;
/// `release` takes it back. Callers normally go through [`Lease`] so that
/// release happens on every exit path.
pub trait ConnectionProvider: Send + Sync {
    type Conn: Connection;

    /// Obtain a usable connection.
    fn acquire(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Conn, crate::Error>> + Send;

    /// Give a connection back. The default simply drops (closes) it.
    fn release(&self, conn: Self::Conn) {
        drop(conn);
    }
}

/// A connection on loan from a [`ConnectionProvider`].
///
/// Dereferences to the connection; dropping the lease releases it back to
/// the provider, including when the borrowing future errors or is cancelled.
pub struct Lease<'p, P: ConnectionProvider> {
    provider: &'p P,
    conn: Option<P::Conn>,
}

impl<'p, P: ConnectionProvider> Lease<'p, P> {
    /// Acquire a connection from `provider` and wrap it.
    pub async fn acquire(provider: &'p P, cx: &Cx) -> Outcome<Self, crate::Error> {
        match provider.acquire(cx).await {
            Outcome::Ok(conn) => {
                tracing::trace!("Connection acquired");
                Outcome::Ok(Self {
                    provider,
                    conn: Some(conn),
                })
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

impl<P: ConnectionProvider> Deref for Lease<'_, P> {
    type Target = P::Conn;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_ref()
            .expect("lease holds its connection until dropped")
    }
}

impl<P: ConnectionProvider> Drop for Lease<'_, P> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.provider.release(conn);
            tracing::trace!("Connection released");
        }
    }
}
