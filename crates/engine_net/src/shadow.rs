//! Last-sent values, used to decide whether a field changed.
//!
//! Each writer owns one [`ShadowCache`]. Entries are keyed by column and
//! entity slot and remember the generation of the entity they were recorded
//! for, so a recycled slot never inherits its predecessor's value. A field
//! that was never sent is compared against `0.0`, the value every column
//! slot starts with.

use std::collections::HashMap;

use engine_component::{Entity, FieldId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShadowEntry {
    generation: u32,
    bits: u32,
}

/// Per-writer copy of the values last written for each `(column, entity)`.
#[derive(Debug, Default, Clone)]
pub struct ShadowCache {
    fields: HashMap<FieldId, Vec<Option<ShadowEntry>>>,
}

impl ShadowCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `value` is bit-identical to what was last recorded
    /// for this entity in this column.
    #[must_use]
    pub fn is_current(&self, field: FieldId, entity: Entity, value: f32) -> bool {
        let entry = self
            .fields
            .get(&field)
            .and_then(|slots| slots.get(entity.slot()).copied().flatten());
        match entry {
            Some(entry) => {
                entry.generation == entity.generation() && entry.bits == value.to_bits()
            }
            None => value.to_bits() == 0,
        }
    }

    /// Remembers `value` as sent.
    pub fn record(&mut self, field: FieldId, entity: Entity, value: f32) {
        let slots = self.fields.entry(field).or_default();
        let slot = entity.slot();
        if slot >= slots.len() {
            slots.resize(slot + 1, None);
        }
        slots[slot] = Some(ShadowEntry {
            generation: entity.generation(),
            bits: value.to_bits(),
        });
    }

    /// Forgets everything, so the next write sends every field.
    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Number of columns with recorded values.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const X: FieldId = FieldId::from_path("Transform.position.x");
    const Y: FieldId = FieldId::from_path("Transform.position.y");

    #[test]
    fn test_unrecorded_compares_against_zero() {
        let cache = ShadowCache::new();
        let e = Entity::from_raw_parts(0, 0);
        assert!(cache.is_current(X, e, 0.0));
        assert!(!cache.is_current(X, e, -0.0));
        assert!(!cache.is_current(X, e, 1.0));
    }

    #[test]
    fn test_record_then_compare() {
        let mut cache = ShadowCache::new();
        let e = Entity::from_raw_parts(3, 0);
        cache.record(X, e, 2.0);
        assert!(cache.is_current(X, e, 2.0));
        assert!(!cache.is_current(X, e, 2.5));
        assert!(!cache.is_current(Y, e, 2.0));
    }

    #[test]
    fn test_recycled_slot_is_changed() {
        let mut cache = ShadowCache::new();
        cache.record(X, Entity::from_raw_parts(1, 0), 4.0);
        assert!(!cache.is_current(X, Entity::from_raw_parts(1, 1), 4.0));
    }

    #[test]
    fn test_bitwise_comparison() {
        let mut cache = ShadowCache::new();
        let e = Entity::from_raw_parts(0, 0);
        cache.record(X, e, f32::NAN);
        assert!(cache.is_current(X, e, f32::NAN));

        cache.record(Y, e, 0.0);
        assert!(!cache.is_current(Y, e, -0.0));
    }

    #[test]
    fn test_clear() {
        let mut cache = ShadowCache::new();
        let e = Entity::from_raw_parts(0, 0);
        cache.record(X, e, 1.0);
        cache.clear();
        assert_eq!(cache.field_count(), 0);
        assert!(!cache.is_current(X, e, 1.0));
        assert!(cache.is_current(X, e, 0.0));
    }
}
