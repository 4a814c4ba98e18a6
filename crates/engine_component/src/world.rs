//! The ECS world: entity lifecycle, component membership, storages and
//! reactive queries.
//!
//! All mutation happens on the tick thread. Entity removal is deferred to
//! [`World::end_tick`] unless requested immediately, so systems later in the
//! same tick still see the entity.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace};

use crate::component::{Component, ComponentTypeId};
use crate::entity::{Entity, EntityAllocator};
use crate::error::EcsError;
use crate::query::{Query, QueryDescriptor, QueryState};
use crate::storage::{ComponentStorage, DenseStorage, ErasedStorage};

/// Entities, their components and the queries over them.
#[derive(Default)]
pub struct World {
    allocator: EntityAllocator,
    /// Component membership, indexed by entity slot.
    membership: Vec<BTreeSet<ComponentTypeId>>,
    storages: HashMap<ComponentTypeId, Box<dyn ErasedStorage>>,
    queries: Vec<QueryState>,
    pending_removal: Vec<Entity>,
    tick: u64,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.allocator.count())
            .field("storages", &self.storages.len())
            .field("queries", &self.queries.len())
            .field("tick", &self.tick)
            .finish()
    }
}

impl World {
    /// Create a new empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed [`end_tick`](Self::end_tick) calls.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    // ── Entities ────────────────────────────────────────────────────────────

    /// Allocate a new entity without components.
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.allocator.allocate();
        if entity.slot() >= self.membership.len() {
            self.membership.resize_with(entity.slot() + 1, BTreeSet::new);
        }
        trace!(%entity, "entity created");
        entity
    }

    /// Remove an entity. The removal completes at the end of the tick unless
    /// `immediate` is set.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NoSuchEntity`] for stale or unknown handles.
    pub fn remove_entity(&mut self, entity: Entity, immediate: bool) -> Result<(), EcsError> {
        if !self.entity_exists(entity) {
            return Err(EcsError::NoSuchEntity(entity));
        }
        if immediate {
            self.destroy(entity);
        } else if !self.pending_removal.contains(&entity) {
            self.pending_removal.push(entity);
        }
        Ok(())
    }

    /// Returns `true` if the handle refers to a live entity.
    #[must_use]
    pub fn entity_exists(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of live entities (including those pending removal).
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.allocator.count()
    }

    /// Iterates over live entities in ascending slot order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.allocator.iter()
    }

    fn destroy(&mut self, entity: Entity) {
        let slot = entity.slot();
        let types = std::mem::take(&mut self.membership[slot]);
        for type_id in &types {
            if let Some(storage) = self.storages.get_mut(type_id) {
                storage.clear_slot(slot);
            }
        }
        self.allocator.free(entity);
        self.pending_removal.retain(|&e| e != entity);
        debug!(%entity, components = types.len(), "entity removed");
    }

    // ── Components ──────────────────────────────────────────────────────────

    /// Attach a component, overwriting any previous value of the same type.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NoSuchEntity`] for stale or unknown handles, or
    /// [`EcsError::TypeCollision`] if `T` shares its id with another type.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), EcsError> {
        if !self.entity_exists(entity) {
            return Err(EcsError::NoSuchEntity(entity));
        }
        self.storage_mut::<T>()?.insert(entity.slot(), value);
        self.membership[entity.slot()].insert(T::component_type_id());
        Ok(())
    }

    /// Detach a component. Unless `keep_data` is set the storage slot is
    /// reset and the old value returned; with `keep_data` the value stays in
    /// storage and a copy is returned.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NoSuchEntity`] for stale or unknown handles.
    pub fn remove_component<T: Component>(
        &mut self,
        entity: Entity,
        keep_data: bool,
    ) -> Result<Option<T>, EcsError> {
        if !self.entity_exists(entity) {
            return Err(EcsError::NoSuchEntity(entity));
        }
        if !self.membership[entity.slot()].remove(&T::component_type_id()) {
            return Ok(None);
        }
        let storage = self.storage_mut::<T>()?;
        Ok(if keep_data {
            storage.fetch(entity.slot())
        } else {
            storage.take(entity.slot())
        })
    }

    /// Returns `true` if the live entity has component `T`.
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.has_component_id(entity, T::component_type_id())
    }

    /// Returns `true` if the live entity has the component with `type_id`.
    #[must_use]
    pub fn has_component_id(&self, entity: Entity, type_id: ComponentTypeId) -> bool {
        self.entity_exists(entity) && self.membership[entity.slot()].contains(&type_id)
    }

    /// An owned copy of the entity's component, if present.
    #[must_use]
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<T> {
        if !self.has_component::<T>(entity) {
            return None;
        }
        self.storage::<T>()?.fetch(entity.slot())
    }

    /// Borrow a component kept in a [`DenseStorage`].
    #[must_use]
    pub fn component<T>(&self, entity: Entity) -> Option<&T>
    where
        T: Component<Storage = DenseStorage<T>>,
    {
        if !self.has_component::<T>(entity) {
            return None;
        }
        self.storage::<T>()?.get(entity.slot())
    }

    /// Mutably borrow a component kept in a [`DenseStorage`].
    #[must_use]
    pub fn component_mut<T>(&mut self, entity: Entity) -> Option<&mut T>
    where
        T: Component<Storage = DenseStorage<T>>,
    {
        if !self.has_component::<T>(entity) {
            return None;
        }
        self.storage_mut::<T>().ok()?.get_mut(entity.slot())
    }

    /// The storage for `T`, if any instance was ever added.
    #[must_use]
    pub fn storage<T: Component>(&self) -> Option<&T::Storage> {
        self.storages
            .get(&T::component_type_id())
            .and_then(|s| s.as_any().downcast_ref::<T::Storage>())
    }

    /// The storage for `T`, created on first use.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::TypeCollision`] if another component type already
    /// owns the storage registered under `T`'s id.
    pub fn storage_mut<T: Component>(&mut self) -> Result<&mut T::Storage, EcsError> {
        let type_id = T::component_type_id();
        let storage = self
            .storages
            .entry(type_id)
            .or_insert_with(|| Box::new(T::Storage::default()));
        storage
            .as_any_mut()
            .downcast_mut::<T::Storage>()
            .ok_or(EcsError::TypeCollision(T::type_name()))
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Register a query. Its first `enter` reports every entity that already
    /// matches.
    pub fn define_query(&mut self, descriptor: QueryDescriptor) -> Query {
        self.queries.push(QueryState::new(descriptor, BTreeSet::new()));
        Query {
            id: self.queries.len() - 1,
        }
    }

    fn matching(&self, descriptor: &QueryDescriptor) -> BTreeSet<Entity> {
        self.allocator
            .iter()
            .filter(|e| descriptor.matches(&self.membership[e.slot()]))
            .collect()
    }

    pub(crate) fn query_matches(&self, query: Query) -> Vec<Entity> {
        self.queries
            .get(query.id)
            .map(|state| self.matching(&state.descriptor).into_iter().collect())
            .unwrap_or_default()
    }

    fn refresh_query(&mut self, query: Query) -> Option<&mut QueryState> {
        let tick = self.tick;
        let current = {
            let state = self.queries.get(query.id)?;
            if state.is_fresh(tick) {
                None
            } else {
                Some(self.matching(&state.descriptor))
            }
        };
        let state = self.queries.get_mut(query.id)?;
        if let Some(current) = current {
            state.refresh(tick, current);
        }
        Some(state)
    }

    pub(crate) fn query_enter(&mut self, query: Query) -> Vec<Entity> {
        self.refresh_query(query)
            .map(QueryState::drain_entered)
            .unwrap_or_default()
    }

    pub(crate) fn query_exit(&mut self, query: Query) -> Vec<Entity> {
        self.refresh_query(query)
            .map(QueryState::drain_exited)
            .unwrap_or_default()
    }

    // ── Tick boundary ───────────────────────────────────────────────────────

    /// Close the current tick: settle query deltas nobody consumed, complete
    /// deferred removals and advance the tick counter.
    pub fn end_tick(&mut self) {
        for id in 0..self.queries.len() {
            if let Some(state) = self.refresh_query(Query { id }) {
                state.discard();
            }
        }

        for entity in std::mem::take(&mut self.pending_removal) {
            if self.entity_exists(entity) {
                self.destroy(entity);
            }
        }

        self.tick += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Health(f32);

    impl Component for Health {
        type Storage = DenseStorage<Self>;

        fn type_name() -> &'static str {
            "Health"
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Frozen;

    /// Claims the same name, and so the same id, as [`Health`].
    #[derive(Debug, Clone, PartialEq)]
    struct Impostor;

    impl Component for Impostor {
        type Storage = DenseStorage<Self>;

        fn type_name() -> &'static str {
            "Health"
        }
    }

    #[test]
    fn test_colliding_type_id_is_an_error() {
        let mut world = World::new();
        let e = world.create_entity();
        world.add_component(e, Health(10.0)).unwrap();

        assert_eq!(
            world.add_component(e, Impostor),
            Err(EcsError::TypeCollision("Health"))
        );
        assert!(world.storage_mut::<Impostor>().is_err());
        assert!(world.storage::<Impostor>().is_none());
        assert_eq!(world.get_component::<Health>(e), Some(Health(10.0)));
    }

    impl Component for Frozen {
        type Storage = DenseStorage<Self>;

        fn type_name() -> &'static str {
            "Frozen"
        }
    }

    #[test]
    fn test_add_get_remove_component() {
        let mut world = World::new();
        let e = world.create_entity();
        world.add_component(e, Health(10.0)).unwrap();

        assert!(world.has_component::<Health>(e));
        assert_eq!(world.get_component::<Health>(e), Some(Health(10.0)));
        assert_eq!(world.component::<Health>(e), Some(&Health(10.0)));

        let removed = world.remove_component::<Health>(e, false).unwrap();
        assert_eq!(removed, Some(Health(10.0)));
        assert!(!world.has_component::<Health>(e));
        assert_eq!(world.get_component::<Health>(e), None);
    }

    #[test]
    fn test_remove_component_keep_data() {
        let mut world = World::new();
        let e = world.create_entity();
        world.add_component(e, Health(3.0)).unwrap();
        world.remove_component::<Health>(e, true).unwrap();

        assert!(!world.has_component::<Health>(e));
        let storage = world.storage::<Health>().unwrap();
        assert_eq!(storage.get(e.slot()), Some(&Health(3.0)));
    }

    #[test]
    fn test_add_component_to_stale_entity_fails() {
        let mut world = World::new();
        let e = world.create_entity();
        world.remove_entity(e, true).unwrap();
        assert_eq!(
            world.add_component(e, Health(1.0)),
            Err(EcsError::NoSuchEntity(e))
        );
    }

    #[test]
    fn test_recycled_entity_reads_empty() {
        let mut world = World::new();
        let old = world.create_entity();
        world.add_component(old, Health(5.0)).unwrap();
        world.remove_entity(old, true).unwrap();

        let new = world.create_entity();
        assert_eq!(new.index(), old.index());
        assert!(!world.has_component::<Health>(new));
        assert_eq!(world.storage::<Health>().unwrap().get(new.slot()), None);
        assert_eq!(world.get_component::<Health>(old), None);
    }

    #[test]
    fn test_deferred_removal_completes_at_end_of_tick() {
        let mut world = World::new();
        let e = world.create_entity();
        world.add_component(e, Health(1.0)).unwrap();
        world.remove_entity(e, false).unwrap();

        assert!(world.entity_exists(e));
        assert!(world.has_component::<Health>(e));

        world.end_tick();
        assert!(!world.entity_exists(e));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_query_matches_with_and_without() {
        let mut world = World::new();
        let a = world.create_entity();
        let b = world.create_entity();
        world.add_component(a, Health(1.0)).unwrap();
        world.add_component(b, Health(1.0)).unwrap();
        world.add_component(b, Frozen).unwrap();

        let q = world.define_query(QueryDescriptor::new().with::<Health>().without::<Frozen>());
        assert_eq!(q.matches(&world), vec![a]);
    }

    #[test]
    fn test_query_enter_exit_disjoint_and_single() {
        let mut world = World::new();
        let q = world.define_query(QueryDescriptor::new().with::<Health>());
        let e = world.create_entity();
        world.add_component(e, Health(1.0)).unwrap();

        assert_eq!(q.enter(&mut world), vec![e]);
        assert!(q.exit(&mut world).is_empty());
        // Drained: a second call in the same tick reports nothing.
        assert!(q.enter(&mut world).is_empty());
        world.end_tick();

        assert!(q.enter(&mut world).is_empty());
        assert!(q.exit(&mut world).is_empty());
        world.end_tick();

        world.remove_component::<Health>(e, false).unwrap();
        assert_eq!(q.exit(&mut world), vec![e]);
        assert!(q.enter(&mut world).is_empty());
        world.end_tick();

        assert!(q.exit(&mut world).is_empty());
        assert!(q.enter(&mut world).is_empty());
    }

    #[test]
    fn test_query_does_not_accumulate_backlog() {
        let mut world = World::new();
        let q = world.define_query(QueryDescriptor::new().with::<Health>());
        let e = world.create_entity();
        world.add_component(e, Health(1.0)).unwrap();

        // Nobody consumes the delta this tick.
        world.end_tick();

        assert!(q.enter(&mut world).is_empty());
    }

    #[test]
    fn test_query_reports_deferred_removal_on_next_tick() {
        let mut world = World::new();
        let q = world.define_query(QueryDescriptor::new().with::<Health>());
        let e = world.create_entity();
        world.add_component(e, Health(1.0)).unwrap();
        assert_eq!(q.enter(&mut world), vec![e]);
        world.end_tick();

        world.remove_entity(e, false).unwrap();
        assert!(q.exit(&mut world).is_empty());
        world.end_tick();

        assert_eq!(q.exit(&mut world), vec![e]);
    }

    #[test]
    fn test_fresh_query_reports_existing_matches() {
        let mut world = World::new();
        let e = world.create_entity();
        world.add_component(e, Health(1.0)).unwrap();

        let q = world.define_query(QueryDescriptor::new().with::<Health>());
        assert_eq!(q.enter(&mut world), vec![e]);
    }
}
