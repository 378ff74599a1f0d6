//! Row materialization: database row to entity plus load-time snapshot.

use crate::change_tracker::Snapshot;
use keel_core::{Dialect, Error, MappingDescriptor, Model, Row};

/// Build an entity and its snapshot from an optional row.
///
/// An absent row yields `Ok(None)`. The snapshot is taken from the freshly
/// built entity, so it reflects exactly what dirty checking will later read.
#[allow(clippy::result_large_err)]
pub fn materialize<M: Model>(
    descriptor: &MappingDescriptor,
    row: Option<Row>,
) -> Result<Option<(M, Snapshot)>, Error> {
    let Some(row) = row else {
        return Ok(None);
    };
    let entity = M::from_row(&row)?;
    let snapshot = Snapshot::capture(descriptor, &entity.to_row())?;
    Ok(Some((entity, snapshot)))
}

/// `SELECT * ... WHERE <pk> = <first placeholder> LIMIT 1` for a descriptor.
pub fn select_by_key(descriptor: &MappingDescriptor, dialect: Dialect) -> String {
    format!(
        "SELECT * FROM {} WHERE {} = {} LIMIT 1",
        dialect.quote_identifier(descriptor.table()),
        dialect.quote_identifier(descriptor.primary_key().column),
        dialect.placeholder(1)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{FieldInfo, MappingErrorKind, Value};

    #[derive(Debug, PartialEq)]
    struct Product {
        id: i64,
        name: String,
    }

    impl Model for Product {
        const TABLE_NAME: &'static str = "products";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::new("id", "id").primary_key(true),
                FieldInfo::new("name", "name"),
            ];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![
                ("id", Value::BigInt(self.id)),
                ("name", Value::Text(self.name.clone())),
            ]
        }

        fn from_row(row: &Row) -> keel_core::Result<Self> {
            Ok(Self {
                id: row.get_named("id")?,
                name: row.get_named("name")?,
            })
        }

        fn primary_key_value(&self) -> Value {
            Value::BigInt(self.id)
        }
    }

    /// Forgets to emit one of its mapped columns.
    struct Lossy;

    impl Model for Lossy {
        const TABLE_NAME: &'static str = "lossy";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::new("id", "id").primary_key(true),
                FieldInfo::new("note", "note"),
            ];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![("id", Value::BigInt(1))]
        }

        fn from_row(_row: &Row) -> keel_core::Result<Self> {
            Ok(Lossy)
        }

        fn primary_key_value(&self) -> Value {
            Value::BigInt(1)
        }
    }

    fn product_row(id: i64, name: &str) -> Row {
        Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::BigInt(id), Value::Text(name.to_string())],
        )
    }

    #[test]
    fn test_materialize_present_row() {
        let d = MappingDescriptor::resolve::<Product>().unwrap();
        let (product, snapshot) = materialize::<Product>(&d, Some(product_row(1, "Laptop")))
            .unwrap()
            .unwrap();
        assert_eq!(
            product,
            Product {
                id: 1,
                name: "Laptop".to_string()
            }
        );
        assert_eq!(snapshot.get("id"), Some(&Value::BigInt(1)));
        assert_eq!(snapshot.get("name"), Some(&Value::Text("Laptop".to_string())));
    }

    #[test]
    fn test_materialize_absent_row() {
        let d = MappingDescriptor::resolve::<Product>().unwrap();
        assert!(materialize::<Product>(&d, None).unwrap().is_none());
    }

    #[test]
    fn test_materialize_missing_column() {
        let d = MappingDescriptor::resolve::<Product>().unwrap();
        let row = Row::new(vec!["id".to_string()], vec![Value::BigInt(1)]);
        let err = materialize::<Product>(&d, Some(row)).unwrap_err();
        assert!(matches!(err, Error::Type(_)), "{err:?}");
    }

    #[test]
    fn test_materialize_wrong_type() {
        let d = MappingDescriptor::resolve::<Product>().unwrap();
        let row = Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::Text("one".to_string()), Value::Text("x".to_string())],
        );
        assert!(materialize::<Product>(&d, Some(row)).is_err());
    }

    #[test]
    fn test_materialize_incomplete_to_row() {
        let d = MappingDescriptor::resolve::<Lossy>().unwrap();
        let row = Row::new(vec!["id".to_string()], vec![Value::BigInt(1)]);
        let Err(Error::Mapping(err)) = materialize::<Lossy>(&d, Some(row)) else {
            panic!("expected mapping error");
        };
        assert_eq!(err.kind, MappingErrorKind::MissingValue);
    }

    #[test]
    fn test_select_by_key() {
        let d = MappingDescriptor::resolve::<Product>().unwrap();
        assert_eq!(
            select_by_key(&d, Dialect::Sqlite),
            "SELECT * FROM \"products\" WHERE \"id\" = ?1 LIMIT 1"
        );
        assert_eq!(
            select_by_key(&d, Dialect::Postgres),
            "SELECT * FROM \"products\" WHERE \"id\" = $1 LIMIT 1"
        );
    }
}
