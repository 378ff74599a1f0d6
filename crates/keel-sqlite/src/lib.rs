//! SQLite driver for Keel.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! Implements the `Connection` trait from keel-core over libsqlite3, and a
//! `SqliteConnector` that provides connections to sessions or pools.
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT)")?;
//! ```
//!
//! # Type Mapping
//!
//! | Rust Type | SQLite Type |
//! |-----------|-------------|
//! | `bool` | INTEGER (0/1) |
//! | `i8`, `i16`, `i32`, `i64` | INTEGER |
//! | `f32`, `f64` | REAL |
//! | `String`, decimals | TEXT |
//! | `Vec<u8>` | BLOB |
//! | `Option<T>` | NULL or T |
//! | `Uuid` | BLOB (16 bytes) |
//! | `Json` | TEXT |
//!
//! # Thread Safety
//!
//! `SqliteConnection` is `Send` and `Sync`; a mutex guards the handle.

pub mod connection;
pub mod connector;
pub mod ffi;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection};
pub use connector::SqliteConnector;

/// The linked SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_version() {
        let version = sqlite_version();
        assert!(
            version.starts_with('3'),
            "Expected SQLite 3.x, got {}",
            version
        );
        assert!(sqlite_version_number() >= 3_000_000);
    }
}
