//! Write synchronization: UPDATE statements for dirty entities.
//!
//! Every dirty entity is written with a full-row UPDATE: all non-key
//! columns are set to their current values and the row is identified by the
//! current primary key. Identifiers are quoted by the dialect and every
//! value is a bound parameter.

use asupersync::{Cx, Outcome};
use keel_core::{Connection, Dialect, Error, MappingDescriptor, Value};

/// A parameterized UPDATE ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: &'static str,
    pub sql: String,
    /// SET values in descriptor order, then the primary key.
    pub params: Vec<Value>,
}

/// Build the UPDATE for one entity from its field-keyed current values.
///
/// Returns `None` when the entity has no non-key column to set.
pub fn build_update(
    descriptor: &MappingDescriptor,
    dialect: Dialect,
    values: &[(&'static str, Value)],
) -> Option<UpdateStatement> {
    let value_of = |name: &str| {
        values
            .iter()
            .find(|(field, _)| *field == name)
            .map_or(Value::Null, |(_, v)| v.clone())
    };

    let mut params = Vec::with_capacity(descriptor.fields().len());
    let mut assignments = Vec::new();
    for field in descriptor.non_key_fields() {
        params.push(value_of(field.name));
        assignments.push(format!(
            "{} = {}",
            dialect.quote_identifier(field.column),
            dialect.placeholder(params.len())
        ));
    }
    if assignments.is_empty() {
        return None;
    }

    let pk = descriptor.primary_key();
    params.push(value_of(pk.name));
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        dialect.quote_identifier(descriptor.table()),
        assignments.join(", "),
        dialect.quote_identifier(pk.column),
        dialect.placeholder(params.len())
    );

    Some(UpdateStatement {
        table: descriptor.table(),
        sql,
        params,
    })
}

impl UpdateStatement {
    /// Execute against `conn`, returning the number of rows affected.
    #[tracing::instrument(level = "debug", skip(self, cx, conn), fields(table = self.table))]
    pub async fn execute<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        tracing::trace!(sql = %self.sql, params = self.params.len(), "SQL");
        match conn.execute(cx, &self.sql, &self.params).await {
            Outcome::Ok(affected) => {
                if affected == 0 {
                    tracing::warn!(table = self.table, "UPDATE matched no rows");
                }
                Outcome::Ok(affected)
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

/// Summary of one flush pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Entities examined.
    pub checked: usize,
    /// Entities found dirty.
    pub dirty: usize,
    /// UPDATE statements that succeeded.
    pub updated: usize,
}

impl FlushReport {
    pub fn new() -> Self {
        Self::default()
    }
}
