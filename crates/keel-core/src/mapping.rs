//! Mapping descriptors: the resolved, validated view of a model's metadata.
//!
//! A [`MappingDescriptor`] is derived once per model type from
//! [`Model::TABLE_NAME`] and [`Model::fields`]. Fields are ordered
//! lexicographically by field name, never by declaration order, so every
//! consumer (materialization, snapshots, dirty checks, UPDATE building)
//! walks the same sequence.
//!
//! Successful resolutions are cached process-wide; descriptors are
//! immutable and shared through `Arc`.

use crate::error::{MappingError, MappingErrorKind};
use crate::field::FieldInfo;
use crate::model::Model;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// One persisted field as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedField {
    /// Rust field name
    pub name: &'static str,
    /// Database column name
    pub column: &'static str,
    pub primary_key: bool,
}

/// Validated table/column metadata for one model type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingDescriptor {
    entity: &'static str,
    table: &'static str,
    fields: Vec<MappedField>,
    primary_key: usize,
}

type Registry = RwLock<HashMap<TypeId, Arc<MappingDescriptor>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

impl MappingDescriptor {
    /// Resolve (and cache) the descriptor for `M`.
    ///
    /// Failures are not cached: a broken model reports the same error on
    /// every attempt.
    pub fn resolve<M: Model>() -> Result<Arc<Self>, MappingError> {
        let type_id = TypeId::of::<M>();
        if let Some(found) = registry()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
        {
            return Ok(Arc::clone(found));
        }

        let descriptor = Arc::new(Self::build(
            std::any::type_name::<M>(),
            M::TABLE_NAME,
            M::fields(),
        )?);
        tracing::debug!(
            entity = descriptor.entity,
            table = descriptor.table,
            fields = descriptor.fields.len(),
            "Resolved mapping descriptor"
        );

        let mut guard = registry().write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(guard.entry(type_id).or_insert(descriptor)))
    }

    /// Validate raw metadata and build a descriptor without caching it.
    pub fn build(
        entity: &'static str,
        table: &'static str,
        fields: &[FieldInfo],
    ) -> Result<Self, MappingError> {
        if table.trim().is_empty() {
            return Err(MappingError::new(
                entity,
                MappingErrorKind::MissingTable,
                "no table name is declared",
            ));
        }

        let mut seen_columns = HashSet::new();
        for field in fields {
            if field.column_name.trim().is_empty() {
                return Err(MappingError::new(
                    entity,
                    MappingErrorKind::MissingColumn,
                    format!("field `{}` has no column mapping", field.name),
                ));
            }
            if !seen_columns.insert(field.column_name) {
                return Err(MappingError::new(
                    entity,
                    MappingErrorKind::DuplicateColumn,
                    format!(
                        "column `{}` is mapped by more than one field",
                        field.column_name
                    ),
                ));
            }
        }

        let mut mapped: Vec<MappedField> = fields
            .iter()
            .map(|f| MappedField {
                name: f.name,
                column: f.column_name,
                primary_key: f.primary_key,
            })
            .collect();
        mapped.sort_by(|a, b| a.name.cmp(b.name));

        let keys: Vec<usize> = mapped
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .map(|(i, _)| i)
            .collect();
        let primary_key = match keys.as_slice() {
            [single] => *single,
            [] => {
                return Err(MappingError::new(
                    entity,
                    MappingErrorKind::MissingPrimaryKey,
                    "no field is marked as primary key",
                ));
            }
            many => {
                let names: Vec<&str> = many.iter().map(|&i| mapped[i].name).collect();
                return Err(MappingError::new(
                    entity,
                    MappingErrorKind::MultiplePrimaryKeys,
                    format!(
                        "exactly one primary key is supported, found {}",
                        names.join(", ")
                    ),
                ));
            }
        };

        Ok(Self {
            entity,
            table,
            fields: mapped,
            primary_key,
        })
    }

    /// Rust type name of the entity.
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    /// All mapped fields, sorted by field name.
    pub fn fields(&self) -> &[MappedField] {
        &self.fields
    }

    pub fn primary_key(&self) -> &MappedField {
        &self.fields[self.primary_key]
    }

    /// Mapped fields other than the primary key, in descriptor order.
    pub fn non_key_fields(&self) -> impl Iterator<Item = &MappedField> {
        self.fields.iter().filter(|f| !f.primary_key)
    }

    pub fn field(&self, name: &str) -> Option<&MappedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}
