//! Core types and traits for Keel.
//!
//! This crate provides the foundations the session is built on:
//!
//! - `Value` and `Row` for parameters and results
//! - `Model` and `FieldInfo`, the declarative entity metadata
//! - `MappingDescriptor`, the validated and cached form of that metadata
//! - `Connection` and `ConnectionProvider` for reaching storage
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Budget, Cx, Outcome, RegionId, TaskId};

pub mod connection;
pub mod dialect;
pub mod error;
pub mod field;
pub mod mapping;
pub mod model;
pub mod row;
pub mod value;

pub use connection::{Connection, ConnectionProvider, Lease};
pub use dialect::Dialect;
pub use error::{Error, MappingError, MappingErrorKind, Result};
pub use field::FieldInfo;
pub use mapping::{MappedField, MappingDescriptor};
pub use model::Model;
pub use row::{FromValue, Row};
pub use value::Value;
