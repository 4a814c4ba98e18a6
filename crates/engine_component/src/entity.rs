//! Entity handles and the recycling allocator.
//!
//! An [`Entity`] is a slot index plus a generation counter. Slots are reused
//! after removal; the generation is bumped on every reuse so handles that
//! outlived their entity stop resolving.

/// A generation-checked entity handle.
///
/// Entities carry no data of their own. Component data lives in storages
/// indexed by [`Entity::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// Build a handle from its raw parts.
    #[must_use]
    pub const fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// The storage slot this entity occupies.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// The slot index as a `usize`, for indexing columns.
    #[must_use]
    pub const fn slot(self) -> usize {
        self.index as usize
    }

    /// How many times the slot had been reused when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    alive: bool,
}

/// Allocates entity handles, recycling freed slots.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl EntityAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a handle, reusing the most recently freed slot if any.
    pub fn allocate(&mut self) -> Entity {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.alive = true;
            return Entity::from_raw_parts(index, slot.generation);
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            alive: true,
        });
        Entity::from_raw_parts(index, 0)
    }

    /// Frees the entity's slot. Returns `false` for stale or unknown handles.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        self.slots[entity.slot()].alive = false;
        self.free.push(entity.index());
        self.live -= 1;
        true
    }

    /// Returns `true` if the handle refers to a live entity of the same
    /// generation.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.slot())
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation())
    }

    /// The number of live entities.
    #[must_use]
    pub fn count(&self) -> usize {
        self.live
    }

    /// One past the highest slot index ever handed out.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterates over live entities in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.alive
                .then(|| Entity::from_raw_parts(index as u32, slot.generation))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_produces_unique_ids() {
        let mut alloc = EntityAllocator::new();
        let e1 = alloc.allocate();
        let e2 = alloc.allocate();
        let e3 = alloc.allocate();
        assert_eq!(e1.index(), 0);
        assert_eq!(e2.index(), 1);
        assert_eq!(e3.index(), 2);
        assert_eq!(alloc.count(), 3);
    }

    #[test]
    fn test_recycled_slot_bumps_generation() {
        let mut alloc = EntityAllocator::new();
        let first = alloc.allocate();
        assert!(alloc.free(first));
        let second = alloc.allocate();

        assert_eq!(first.index(), second.index());
        assert_eq!(second.generation(), first.generation() + 1);
        assert!(!alloc.is_alive(first));
        assert!(alloc.is_alive(second));
    }

    #[test]
    fn test_double_free_is_rejected() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        assert!(alloc.free(e));
        assert!(!alloc.free(e));
        assert_eq!(alloc.count(), 0);
    }

    #[test]
    fn test_iter_skips_freed_slots() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        let c = alloc.allocate();
        alloc.free(b);
        let live: Vec<_> = alloc.iter().collect();
        assert_eq!(live, vec![a, c]);
        assert_eq!(alloc.capacity(), 3);
    }

    #[test]
    fn test_display() {
        assert_eq!(Entity::from_raw_parts(4, 2).to_string(), "Entity(4v2)");
    }
}
