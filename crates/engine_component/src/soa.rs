//! Flat scalar columns for structure-of-arrays component storage.
//!
//! A [`F32Column`] holds one scalar sub-field (for example `position.x`) for
//! every entity slot. Columns grow on demand and never shrink, so a column is
//! always at least as long as the highest slot written to it.

use crate::component::fnv1a;
use crate::entity::Entity;

/// Stable identity of a column, hashed from its dotted path
/// (e.g. `"Transform.position.x"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u64);

impl FieldId {
    /// Compute the id of a column from its dotted path.
    #[must_use]
    pub const fn from_path(path: &str) -> Self {
        Self(fnv1a(path))
    }
}

/// One `f32` per entity slot.
#[derive(Debug, Clone)]
pub struct F32Column {
    id: FieldId,
    values: Vec<f32>,
}

impl F32Column {
    /// Creates an empty column identified by `path`.
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            id: FieldId::from_path(path),
            values: Vec::new(),
        }
    }

    /// The column identity.
    #[must_use]
    pub fn id(&self) -> FieldId {
        self.id
    }

    /// Reads a slot. Slots never written read as `0.0`.
    #[must_use]
    pub fn get(&self, slot: usize) -> f32 {
        self.values.get(slot).copied().unwrap_or(0.0)
    }

    /// Reads the slot of an entity.
    #[must_use]
    pub fn of(&self, entity: Entity) -> f32 {
        self.get(entity.slot())
    }

    /// Writes a slot, growing the column if needed.
    pub fn set(&mut self, slot: usize, value: f32) {
        if slot >= self.values.len() {
            self.values.resize(slot + 1, 0.0);
        }
        self.values[slot] = value;
    }

    /// Resets a slot to `0.0`.
    pub fn clear(&mut self, slot: usize) {
        if let Some(value) = self.values.get_mut(slot) {
            *value = 0.0;
        }
    }

    /// Number of slots backed by memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no slot was ever written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Grows the column to at least `len` slots.
    pub fn reserve_slots(&mut self, len: usize) {
        if len > self.values.len() {
            self.values.resize(len, 0.0);
        }
    }

    /// The raw values.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritten_slot_reads_zero() {
        let column = F32Column::new("Test.x");
        assert_eq!(column.get(42), 0.0);
        assert!(column.is_empty());
    }

    #[test]
    fn test_set_grows_and_never_shrinks() {
        let mut column = F32Column::new("Test.x");
        column.set(9, 1.5);
        assert_eq!(column.len(), 10);
        assert_eq!(column.get(9), 1.5);

        column.clear(9);
        assert_eq!(column.get(9), 0.0);
        assert_eq!(column.len(), 10);

        column.reserve_slots(4);
        assert_eq!(column.len(), 10);
    }

    #[test]
    fn test_field_id_is_path_derived() {
        let a = F32Column::new("Transform.position.x");
        let b = F32Column::new("Transform.position.x");
        let c = F32Column::new("Transform.position.y");
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }
}
