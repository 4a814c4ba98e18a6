//! ECS error types.

use crate::entity::Entity;

/// Errors returned by [`World`](crate::World) mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// The handle does not refer to a live entity (never allocated, removed,
    /// or from an older generation of a recycled slot).
    #[error("no such entity: {0}")]
    NoSuchEntity(Entity),
    /// Two component types share a name, so their ids collide.
    #[error("component type id collision for {0}")]
    TypeCollision(&'static str),
}
