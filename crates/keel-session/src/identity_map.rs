//! Identity map: one live instance per entity key.
//!
//! Entities are stored as shared handles (`Arc<RwLock<M>>`), so finding the
//! same key twice yields pointer-identical handles and a mutation through
//! one is visible through the other.
//!
//! The map is heterogeneous. Each entry type-erases its handle and keeps a
//! monomorphized reader so the flush pass can lower any entity to column
//! values without knowing its concrete type.

use crate::key::EntityKey;
use keel_core::{MappingDescriptor, Model, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared handle to a tracked entity.
pub type ModelRef<M> = Arc<RwLock<M>>;

type RowReader = fn(&(dyn Any + Send + Sync)) -> Option<Vec<(&'static str, Value)>>;

fn read_row<M: Model>(handle: &(dyn Any + Send + Sync)) -> Option<Vec<(&'static str, Value)>> {
    let model = handle.downcast_ref::<ModelRef<M>>()?;
    let guard = model.read().unwrap_or_else(PoisonError::into_inner);
    Some(guard.to_row())
}

struct IdentityEntry {
    /// Holds a `ModelRef<M>` for the key's entity type.
    handle: Box<dyn Any + Send + Sync>,
    descriptor: Arc<MappingDescriptor>,
    read_row: RowReader,
}

/// Per-session map from [`EntityKey`] to the live entity.
#[derive(Default)]
pub struct IdentityMap {
    entries: HashMap<EntityKey, IdentityEntry>,
}

impl IdentityMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity under `key` and return its handle.
    ///
    /// If the key is already present the existing handle is returned and
    /// `model` is discarded.
    pub fn insert<M: Model>(
        &mut self,
        key: EntityKey,
        model: M,
        descriptor: Arc<MappingDescriptor>,
    ) -> ModelRef<M> {
        if let Some(existing) = self.get::<M>(&key) {
            return existing;
        }

        let handle: ModelRef<M> = Arc::new(RwLock::new(model));
        self.entries.insert(
            key,
            IdentityEntry {
                handle: Box::new(Arc::clone(&handle)),
                descriptor,
                read_row: read_row::<M>,
            },
        );
        handle
    }

    /// The cached handle for `key`, if any.
    pub fn get<M: Model>(&self, key: &EntityKey) -> Option<ModelRef<M>> {
        let entry = self.entries.get(key)?;
        entry.handle.downcast_ref::<ModelRef<M>>().map(Arc::clone)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Descriptor of the entity stored under `key`.
    pub fn descriptor(&self, key: &EntityKey) -> Option<Arc<MappingDescriptor>> {
        self.entries.get(key).map(|e| Arc::clone(&e.descriptor))
    }

    /// Current `(column, value)` pairs of the entity stored under `key`.
    pub fn current_row(&self, key: &EntityKey) -> Option<Vec<(&'static str, Value)>> {
        let entry = self.entries.get(key)?;
        (entry.read_row)(entry.handle.as_ref())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
