//! Session cache keys.

use keel_core::{Model, Value};
use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of one entity within a session: its type plus its primary key.
///
/// Integer keys are normalized, so `find::<M>(5_i32)` and
/// `find::<M>(5_i64)` address the same entity.
#[derive(Debug, Clone)]
pub struct EntityKey {
    type_id: TypeId,
    entity: &'static str,
    id: Value,
}

impl EntityKey {
    /// Key for entity type `M` with primary key `id`.
    pub fn of<M: Model>(id: impl Into<Value>) -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            entity: std::any::type_name::<M>(),
            id: id.into().to_key(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name of the entity, for diagnostics.
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    /// The normalized primary key value.
    pub fn id(&self) -> &Value {
        &self.id
    }
}

impl PartialEq for EntityKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.id.key_eq(&other.id)
    }
}

impl Eq for EntityKey {}

impl Hash for EntityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.id.hash_into(state);
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.entity.rsplit("::").next().unwrap_or(self.entity);
        write!(f, "{short}#{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{FieldInfo, Row};
    use std::collections::HashSet;

    struct Widget;
    struct Gizmo;

    macro_rules! stub_model {
        ($ty:ident, $table:literal) => {
            impl Model for $ty {
                const TABLE_NAME: &'static str = $table;

                fn fields() -> &'static [FieldInfo] {
                    &[]
                }

                fn to_row(&self) -> Vec<(&'static str, Value)> {
                    Vec::new()
                }

                fn from_row(_row: &Row) -> keel_core::Result<Self> {
                    Ok($ty)
                }

                fn primary_key_value(&self) -> Value {
                    Value::Null
                }
            }
        };
    }

    stub_model!(Widget, "widgets");
    stub_model!(Gizmo, "gizmos");

    #[test]
    fn test_integer_widths_collapse() {
        let a = EntityKey::of::<Widget>(5_i32);
        let b = EntityKey::of::<Widget>(5_i64);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_type_is_part_of_identity() {
        assert_ne!(EntityKey::of::<Widget>(1_i64), EntityKey::of::<Gizmo>(1_i64));
    }

    #[test]
    fn test_value_kind_is_part_of_identity() {
        assert_ne!(EntityKey::of::<Widget>(1_i64), EntityKey::of::<Widget>("1"));
    }

    #[test]
    fn test_display_uses_short_type_name() {
        let key = EntityKey::of::<Widget>(42_i64);
        assert_eq!(key.to_string(), "Widget#42");
        assert!(key.entity().ends_with("Widget"));
    }
}
