//! Snapshot-based change tracking.
//!
//! A [`Snapshot`] records each mapped field's value at load time, keyed by
//! field name and ordered like the entity's [`MappingDescriptor`]. The
//! [`ChangeTracker`] keeps one snapshot per tracked entity and decides
//! whether an entity is dirty by comparing its current field values against
//! that baseline.

use crate::key::EntityKey;
use keel_core::{MappingDescriptor, MappingError, MappingErrorKind, Value};
use std::collections::HashMap;

/// Lower column-keyed row data to field-keyed values in descriptor order.
///
/// Fails if a mapped column is absent from `row`.
pub fn field_values(
    descriptor: &MappingDescriptor,
    row: &[(&'static str, Value)],
) -> Result<Vec<(&'static str, Value)>, MappingError> {
    descriptor
        .fields()
        .iter()
        .map(|field| {
            row.iter()
                .find(|(column, _)| *column == field.column)
                .map(|(_, value)| (field.name, value.clone()))
                .ok_or_else(|| {
                    MappingError::new(
                        descriptor.entity(),
                        MappingErrorKind::MissingValue,
                        format!(
                            "no value for field `{}` (column `{}`)",
                            field.name, field.column
                        ),
                    )
                })
        })
        .collect()
}

/// Field values of one entity as they were when it was loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    values: Vec<(&'static str, Value)>,
}

impl Snapshot {
    /// Capture a snapshot from the entity's `to_row` output.
    pub fn capture(
        descriptor: &MappingDescriptor,
        row: &[(&'static str, Value)],
    ) -> Result<Self, MappingError> {
        field_values(descriptor, row).map(Self::from_field_values)
    }

    /// Wrap values already in field-keyed descriptor order.
    pub fn from_field_values(values: Vec<(&'static str, Value)>) -> Self {
        Self { values }
    }

    /// Snapshot value of the named field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(name, v)| (*name, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// First field, in descriptor order, whose current value differs.
    pub fn first_change(&self, current: &[(&'static str, Value)]) -> Option<&'static str> {
        current.iter().find_map(|(name, value)| {
            let changed = self.get(name) != Some(value);
            tracing::trace!(field = *name, changed, "Dirty check");
            changed.then_some(*name)
        })
    }

    /// Every field whose current value differs, in descriptor order.
    pub fn changed_fields(&self, current: &[(&'static str, Value)]) -> Vec<&'static str> {
        current
            .iter()
            .filter(|(name, value)| self.get(name) != Some(value))
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Snapshots of every tracked entity, in load order.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    snapshots: HashMap<EntityKey, Snapshot>,
    order: Vec<EntityKey>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the load-time snapshot for `key`.
    ///
    /// An existing snapshot is never overwritten; use [`ChangeTracker::rebaseline`].
    pub fn record(&mut self, key: EntityKey, snapshot: Snapshot) {
        if self.snapshots.contains_key(&key) {
            return;
        }
        tracing::trace!(key = %key, fields = snapshot.len(), "Recorded snapshot");
        self.order.push(key.clone());
        self.snapshots.insert(key, snapshot);
    }

    /// Replace the baseline after the entity was written.
    pub fn rebaseline(&mut self, key: &EntityKey, snapshot: Snapshot) {
        if let Some(existing) = self.snapshots.get_mut(key) {
            *existing = snapshot;
        }
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Snapshot> {
        self.snapshots.get(key)
    }

    /// Tracked keys in the order they were loaded.
    pub fn keys(&self) -> &[EntityKey] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.order.clear();
    }
}
