//! Opening SQLite connections on demand.

use crate::connection::{SqliteConfig, SqliteConnection};
use keel_core::{ConnectionProvider, Cx, Error, Outcome};
use std::future::Future;

/// A [`ConnectionProvider`] that opens a fresh connection per acquire and
/// closes it on release.
///
/// Wrap it in a pool to reuse connections. Note that every connection to
/// `":memory:"` sees its own private database.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    config: SqliteConfig,
}

impl SqliteConnector {
    pub fn new(config: SqliteConfig) -> Self {
        Self { config }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self::new(SqliteConfig::file(path))
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }
}

impl ConnectionProvider for SqliteConnector {
    type Conn = SqliteConnection;

    fn acquire(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Conn, Error>> + Send {
        let result = match cx.cancel_reason() {
            Some(reason) => Outcome::Cancelled(reason),
            None => SqliteConnection::open(&self.config).map_or_else(Outcome::Err, Outcome::Ok),
        };
        async move { result }
    }
}
