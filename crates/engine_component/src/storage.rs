//! Component storages.
//!
//! The world owns one storage per component type. Storages are indexed by
//! entity slot and know nothing about membership; the world decides which
//! entities currently have a component.

use std::any::Any;

/// Storage for one component type.
pub trait ComponentStorage: Default + Send + Sync + 'static {
    /// The component value stored.
    type Item;

    /// Stores `item` at `slot`, overwriting whatever was there.
    fn insert(&mut self, slot: usize, item: Self::Item);

    /// Removes the value at `slot`, resetting the slot to its empty state.
    fn take(&mut self, slot: usize) -> Option<Self::Item>;

    /// Returns an owned copy of the value at `slot`.
    fn fetch(&self, slot: usize) -> Option<Self::Item>;

    /// Resets the slot without returning its value.
    fn clear(&mut self, slot: usize) {
        let _ = self.take(slot);
    }
}

/// Slot-indexed `Option<T>` storage for components that are not hot numeric
/// data (identity records, tags, handles).
#[derive(Debug)]
pub struct DenseStorage<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for DenseStorage<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> DenseStorage<T> {
    /// Borrow the value at `slot`.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Mutably borrow the value at `slot`.
    #[must_use]
    pub fn get_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    /// Iterates over occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, value)| value.as_ref().map(|v| (slot, v)))
    }
}

impl<T: Clone + Send + Sync + 'static> ComponentStorage for DenseStorage<T> {
    type Item = T;

    fn insert(&mut self, slot: usize, item: T) {
        if slot >= self.slots.len() {
            self.slots.resize_with(slot + 1, || None);
        }
        self.slots[slot] = Some(item);
    }

    fn take(&mut self, slot: usize) -> Option<T> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    fn fetch(&self, slot: usize) -> Option<T> {
        self.get(slot).cloned()
    }
}

/// Type-erased access used by the world for whole-entity teardown.
pub(crate) trait ErasedStorage: Send + Sync {
    fn clear_slot(&mut self, slot: usize);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<S: ComponentStorage> ErasedStorage for S {
    fn clear_slot(&mut self, slot: usize) {
        self.clear(slot);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_insert_take() {
        let mut storage = DenseStorage::<String>::default();
        storage.insert(3, "three".to_string());
        assert_eq!(storage.get(3).map(String::as_str), Some("three"));
        assert_eq!(storage.get(2), None);
        assert_eq!(storage.take(3).as_deref(), Some("three"));
        assert_eq!(storage.fetch(3), None);
    }

    #[test]
    fn test_dense_iter_only_occupied() {
        let mut storage = DenseStorage::<u32>::default();
        storage.insert(0, 10);
        storage.insert(4, 40);
        let items: Vec<_> = storage.iter().map(|(slot, v)| (slot, *v)).collect();
        assert_eq!(items, vec![(0, 10), (4, 40)]);
    }

    #[test]
    fn test_erased_clear() {
        let mut storage = DenseStorage::<u32>::default();
        storage.insert(1, 7);
        let erased: &mut dyn ErasedStorage = &mut storage;
        erased.clear_slot(1);
        let storage = erased
            .as_any()
            .downcast_ref::<DenseStorage<u32>>()
            .expect("downcast");
        assert_eq!(storage.get(1), None);
    }
}
