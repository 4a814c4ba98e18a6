//! Query descriptors and reactive query state.
//!
//! A [`QueryDescriptor`] declares which component types an entity must have
//! (and must not have) to match. Defining it in a [`World`](crate::World)
//! yields a [`Query`] handle that can list current matches as well as the
//! entities that entered or exited the match set since the query last looked.

use std::collections::BTreeSet;

use crate::component::{Component, ComponentTypeId};
use crate::entity::Entity;

/// Describes the component types a query matches on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDescriptor {
    /// Component types an entity must have.
    pub with: Vec<ComponentTypeId>,
    /// Component types an entity must not have.
    pub without: Vec<ComponentTypeId>,
}

impl QueryDescriptor {
    /// Create a new empty query descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require component `T`.
    #[must_use]
    pub fn with<T: Component>(self) -> Self {
        self.with_id(T::component_type_id())
    }

    /// Exclude entities that have component `T`.
    #[must_use]
    pub fn without<T: Component>(self) -> Self {
        self.without_id(T::component_type_id())
    }

    /// Require a component by id.
    #[must_use]
    pub fn with_id(mut self, type_id: ComponentTypeId) -> Self {
        if !self.with.contains(&type_id) {
            self.with.push(type_id);
        }
        self
    }

    /// Exclude a component by id.
    #[must_use]
    pub fn without_id(mut self, type_id: ComponentTypeId) -> Self {
        if !self.without.contains(&type_id) {
            self.without.push(type_id);
        }
        self
    }

    /// Returns `true` if an entity with the given component set matches.
    #[must_use]
    pub fn matches(&self, components: &BTreeSet<ComponentTypeId>) -> bool {
        self.with.iter().all(|ty| components.contains(ty))
            && !self.without.iter().any(|ty| components.contains(ty))
    }
}

/// Handle to a query defined in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Query {
    pub(crate) id: usize,
}

impl Query {
    /// All entities currently matching, in ascending slot order.
    #[must_use]
    pub fn matches(self, world: &crate::World) -> Vec<Entity> {
        world.query_matches(self)
    }

    /// Entities that started matching since this query last looked.
    ///
    /// The delta is computed once per tick and drained by the caller.
    pub fn enter(self, world: &mut crate::World) -> Vec<Entity> {
        world.query_enter(self)
    }

    /// Entities that stopped matching since this query last looked.
    pub fn exit(self, world: &mut crate::World) -> Vec<Entity> {
        world.query_exit(self)
    }
}

/// Per-query reactive bookkeeping owned by the world.
#[derive(Debug)]
pub(crate) struct QueryState {
    pub(crate) descriptor: QueryDescriptor,
    /// The match set as of the last delta computation.
    observed: BTreeSet<Entity>,
    entered: Vec<Entity>,
    exited: Vec<Entity>,
    computed_at: Option<u64>,
}

impl QueryState {
    pub(crate) fn new(descriptor: QueryDescriptor, current: BTreeSet<Entity>) -> Self {
        Self {
            descriptor,
            observed: current,
            entered: Vec::new(),
            exited: Vec::new(),
            computed_at: None,
        }
    }

    /// Diffs `current` against the observed set, at most once per tick.
    pub(crate) fn refresh(&mut self, tick: u64, current: BTreeSet<Entity>) {
        if self.computed_at == Some(tick) {
            return;
        }
        self.entered = current.difference(&self.observed).copied().collect();
        self.exited = self.observed.difference(&current).copied().collect();
        self.observed = current;
        self.computed_at = Some(tick);
    }

    pub(crate) fn is_fresh(&self, tick: u64) -> bool {
        self.computed_at == Some(tick)
    }

    pub(crate) fn drain_entered(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.entered)
    }

    pub(crate) fn drain_exited(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.exited)
    }

    /// Drops undrained deltas at the end of a tick.
    pub(crate) fn discard(&mut self) {
        self.entered.clear();
        self.exited.clear();
    }
}
