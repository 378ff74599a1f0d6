//! Keel - a small unit-of-work ORM session.
//!
//! Keel maps structs to tables and keeps track of what you load:
//!
//! - Declarative mapping with `#[derive(Model)]`
//! - One live instance per (type, primary key) inside a session
//! - Snapshot dirty checking, with changed rows written back on close
//! - Fully parameterized SQL
//! - SQLite driver and a bounded connection pool, on asupersync
//!
//! # Quick Start
//!
//! ```ignore
//! use keel::prelude::*;
//!
//! #[derive(Model, Debug)]
//! #[keel(table = "products")]
//! struct Product {
//!     #[keel(primary_key)]
//!     id: i64,
//!     name: String,
//! }
//!
//! async fn rename(cx: &Cx, factory: &SessionFactory<SqliteConnector>) {
//!     let mut session = factory.create_session();
//!     if let Outcome::Ok(Some(product)) = session.find::<Product>(cx, 1_i64).await {
//!         product.write().unwrap().name = "New laptop".to_string();
//!     }
//!     match session.close(cx).await {
//!         Outcome::Ok(report) => println!("{} updated", report.updated),
//!         Outcome::Err(e) => eprintln!("Error: {e}"),
//!         _ => {}
//!     }
//! }
//! ```

// Re-export all public types from sub-crates
pub use keel_core::{
    // asupersync re-exports
    Budget,
    // Core types
    Connection,
    ConnectionProvider,
    Cx,
    Dialect,
    Error,
    FieldInfo,
    Lease,
    MappedField,
    MappingDescriptor,
    MappingError,
    MappingErrorKind,
    Model,
    Outcome,
    RegionId,
    Result,
    Row,
    TaskId,
    Value,
};

pub use keel_macros::Model;

pub use keel_session::{
    EntityKey, FlushReport, ModelRef, Session, SessionError, SessionFactory, Snapshot,
};

pub use keel_pool::{Pool, PoolConfig, PoolStats};

pub use keel_sqlite::{OpenFlags, SqliteConfig, SqliteConnection, SqliteConnector};

/// Installs a `tracing` subscriber reading `RUST_LOG`, falling back to
/// `default_filter` when the variable is unset or invalid.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(
    default_filter: &str,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init()
}

/// Prelude module for convenient imports.
///
/// ```ignore
/// use keel::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // asupersync
        Cx,
        Outcome,
        // Core traits and types (Model is both the trait and the derive)
        Connection,
        ConnectionProvider,
        Error,
        Model,
        ModelRef,
        Row,
        Value,
        // Session
        Session,
        SessionError,
        SessionFactory,
        // Storage
        Pool,
        PoolConfig,
        SqliteConfig,
        SqliteConnection,
        SqliteConnector,
    };
}
