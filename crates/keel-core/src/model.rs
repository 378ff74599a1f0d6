//! Model trait for mapping structs to table rows.
//!
//! The `Model` trait is the declarative metadata boundary: a table name,
//! one [`FieldInfo`] per persisted field, and conversions between the
//! struct and a [`Row`]. It is normally derived with `#[derive(Model)]`
//! from `keel-macros`; the session resolves it once per type into a
//! [`MappingDescriptor`](crate::MappingDescriptor).

use crate::Result;
use crate::field::FieldInfo;
use crate::row::Row;
use crate::value::Value;

/// Trait for types that can be mapped to database tables.
///
/// # Example
///
/// ```ignore
/// use keel::Model;
///
/// #[derive(Model, Debug)]
/// #[keel(table = "products")]
/// struct Product {
///     #[keel(primary_key)]
///     id: i64,
///     name: String,
/// }
/// ```
pub trait Model: Sized + Send + Sync + 'static {
    /// The name of the database table.
    const TABLE_NAME: &'static str;

    /// Field metadata for all persisted fields, in declaration order.
    fn fields() -> &'static [FieldInfo];

    /// Lower the current field values to `(column_name, value)` pairs.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Construct a model instance from a database row.
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self>;

    /// Current value of the primary key field.
    fn primary_key_value(&self) -> Value;
}
