//! Connection pooling for Keel.
//!
//! [`Pool`] wraps any [`ConnectionProvider`] and is itself one, so a session
//! can run over a pool or over a bare connector without changes. Released
//! connections are kept idle for reuse; the pool never opens more than
//! `max_connections` at once and fails fast instead of waiting when they
//! are all checked out.

use keel_core::error::{PoolError, PoolErrorKind};
use keel_core::{Connection, ConnectionProvider, Cx, Error, Outcome};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections open at once (idle + active)
    pub max_connections: usize,
    /// Maximum number of idle connections kept for reuse
    pub max_idle: usize,
    /// Ping idle connections before handing them out
    pub test_on_checkout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            max_idle: 10,
            test_on_checkout: true,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given max connections.
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            max_idle: max_connections,
            ..Default::default()
        }
    }

    pub fn max_idle(mut self, n: usize) -> Self {
        self.max_idle = n;
        self
    }

    /// Enable/disable test on checkout.
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of connections (active + idle)
    pub total_connections: usize,
    pub idle_connections: usize,
    pub active_connections: usize,
    /// Connections opened through the wrapped provider so far
    pub created: usize,
    /// Acquires rejected because the pool was full
    pub exhausted: usize,
}

/// A bounded pool over another connection provider.
pub struct Pool<P: ConnectionProvider> {
    provider: P,
    config: PoolConfig,
    idle: Mutex<Vec<P::Conn>>,
    total: AtomicUsize,
    active: AtomicUsize,
    created: AtomicUsize,
    exhausted: AtomicUsize,
}

impl<P: ConnectionProvider> Pool<P> {
    /// Create a pool over `provider`. No connection is opened until the
    /// first acquire.
    pub fn new(provider: P, config: PoolConfig) -> Result<Self, Error> {
        if config.max_connections == 0 {
            return Err(Error::Pool(PoolError {
                kind: PoolErrorKind::Config,
                message: "max_connections must be at least 1".to_string(),
            }));
        }
        tracing::debug!(
            max_connections = config.max_connections,
            max_idle = config.max_idle,
            "Created connection pool"
        );
        Ok(Self {
            provider,
            config,
            idle: Mutex::new(Vec::new()),
            total: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            exhausted: AtomicUsize::new(0),
        })
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the current pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_connections: self.total.load(Ordering::Acquire),
            idle_connections: self.idle_guard().len(),
            active_connections: self.active.load(Ordering::Acquire),
            created: self.created.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }

    /// Check if the pool is at capacity.
    pub fn at_capacity(&self) -> bool {
        self.total.load(Ordering::Acquire) >= self.config.max_connections
    }

    fn idle_guard(&self) -> MutexGuard<'_, Vec<P::Conn>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve room for one more open connection.
    fn try_reserve(&self) -> bool {
        self.total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.config.max_connections).then_some(n + 1)
            })
            .is_ok()
    }

    fn discard(&self, conn: P::Conn) {
        drop(conn);
        self.total.fetch_sub(1, Ordering::AcqRel);
    }

    fn checked_out(&self, conn: P::Conn) -> Outcome<P::Conn, Error> {
        self.active.fetch_add(1, Ordering::AcqRel);
        Outcome::Ok(conn)
    }
}

impl<P: ConnectionProvider> ConnectionProvider for Pool<P> {
    type Conn = P::Conn;

    fn acquire(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Conn, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }

            loop {
                let next = self.idle_guard().pop();
                let Some(conn) = next else {
                    break;
                };
                if !self.config.test_on_checkout || conn.is_valid(cx).await {
                    tracing::debug!("Reusing idle connection");
                    return self.checked_out(conn);
                }
                tracing::debug!("Discarding idle connection that failed its ping");
                self.discard(conn);
            }

            if !self.try_reserve() {
                self.exhausted.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    max_connections = self.config.max_connections,
                    "Connection pool exhausted"
                );
                return Outcome::Err(Error::Pool(PoolError {
                    kind: PoolErrorKind::Exhausted,
                    message: format!(
                        "all {} connections are in use",
                        self.config.max_connections
                    ),
                }));
            }

            match self.provider.acquire(cx).await {
                Outcome::Ok(conn) => {
                    self.created.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Opened new pooled connection");
                    self.checked_out(conn)
                }
                Outcome::Err(e) => {
                    self.total.fetch_sub(1, Ordering::AcqRel);
                    Outcome::Err(e)
                }
                Outcome::Cancelled(r) => {
                    self.total.fetch_sub(1, Ordering::AcqRel);
                    Outcome::Cancelled(r)
                }
                Outcome::Panicked(p) => {
                    self.total.fetch_sub(1, Ordering::AcqRel);
                    Outcome::Panicked(p)
                }
            }
        }
    }

    fn release(&self, conn: Self::Conn) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        let mut idle = self.idle_guard();
        if idle.len() < self.config.max_idle {
            idle.push(conn);
            tracing::trace!(idle = idle.len(), "Connection returned to pool");
        } else {
            drop(idle);
            tracing::trace!("Idle limit reached, closing connection");
            self.discard(conn);
        }
    }
}

impl<P: ConnectionProvider> Drop for Pool<P> {
    fn drop(&mut self) {
        let idle = self.idle_guard().len();
        tracing::debug!(idle, "Closing connection pool");
    }
}
