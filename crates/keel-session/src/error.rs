//! Session error types.

use keel_core::{Error, MappingError, Value};
use std::fmt;

/// Errors surfaced by [`Session`](crate::Session) operations.
#[derive(Debug)]
pub enum SessionError {
    /// Entity metadata is incomplete or inconsistent.
    Mapping(MappingError),
    /// No connection could be obtained.
    Connection(Error),
    /// Loading an entity failed (SELECT or materialization).
    Query {
        table: &'static str,
        id: Value,
        error: Error,
    },
    /// Writing one dirty entity failed.
    Update {
        table: &'static str,
        primary_key: Value,
        error: Error,
    },
    /// One or more writes of a flush pass failed.
    Flush {
        failures: Vec<SessionError>,
        updated: usize,
    },
}

impl SessionError {
    /// The underlying core error, if this wraps exactly one.
    pub fn core_error(&self) -> Option<&Error> {
        match self {
            SessionError::Connection(e)
            | SessionError::Query { error: e, .. }
            | SessionError::Update { error: e, .. } => Some(e),
            SessionError::Mapping(_) | SessionError::Flush { .. } => None,
        }
    }

    /// Failures collected by a flush pass; empty for other variants.
    pub fn failures(&self) -> &[SessionError] {
        match self {
            SessionError::Flush { failures, .. } => failures,
            _ => &[],
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Mapping(e) => write!(f, "{e}"),
            SessionError::Connection(e) => write!(f, "Could not obtain connection: {e}"),
            SessionError::Query { table, id, error } => {
                write!(f, "Failed to load {table} with id {id}: {error}")
            }
            SessionError::Update {
                table,
                primary_key,
                error,
            } => write!(f, "Failed to update {table} with id {primary_key}: {error}"),
            SessionError::Flush { failures, updated } => {
                write!(
                    f,
                    "Flush failed for {} entit{} ({updated} updated)",
                    failures.len(),
                    if failures.len() == 1 { "y" } else { "ies" }
                )?;
                for failure in failures {
                    write!(f, "; {failure}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Mapping(e) => Some(e),
            SessionError::Connection(e)
            | SessionError::Query { error: e, .. }
            | SessionError::Update { error: e, .. } => Some(e),
            SessionError::Flush { failures, .. } => failures
                .first()
                .map(|e| e as &(dyn std::error::Error + 'static)),
        }
    }
}

impl From<MappingError> for SessionError {
    fn from(err: MappingError) -> Self {
        SessionError::Mapping(err)
    }
}
