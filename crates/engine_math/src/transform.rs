//! 3D transform component.
//!
//! [`Transform3D`] is position, rotation and scale in 3D space. Its storage
//! keeps each scalar in its own column so the network codec can diff and
//! patch individual fields.

use engine_component::{Component, ComponentStorage};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::soa::{QuatSoA, Vec3SoA};

/// A 3D transform representing position, rotation, and scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Transform3D {
    /// World-space position.
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Per-axis scale.
    pub scale: Vec3,
}

impl Transform3D {
    /// The identity transform: origin, no rotation, unit scale.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Create a new transform with the given position and default rotation/scale.
    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Create a new transform with position and rotation.
    #[must_use]
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Self::IDENTITY
        }
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Column storage for [`Transform3D`].
#[derive(Debug, Clone)]
pub struct TransformStorage {
    pub position: Vec3SoA,
    pub rotation: QuatSoA,
    pub scale: Vec3SoA,
}

impl Default for TransformStorage {
    fn default() -> Self {
        Self {
            position: Vec3SoA::new("Transform.position"),
            rotation: QuatSoA::new("Transform.rotation"),
            scale: Vec3SoA::new("Transform.scale"),
        }
    }
}

impl ComponentStorage for TransformStorage {
    type Item = Transform3D;

    fn insert(&mut self, slot: usize, item: Transform3D) {
        self.position.set_slot(slot, item.position);
        self.rotation.set_slot(slot, item.rotation);
        self.scale.set_slot(slot, item.scale);
    }

    fn take(&mut self, slot: usize) -> Option<Transform3D> {
        let value = self.fetch(slot);
        self.position.clear_slot(slot);
        self.rotation.clear_slot(slot);
        self.scale.clear_slot(slot);
        value
    }

    fn fetch(&self, slot: usize) -> Option<Transform3D> {
        Some(Transform3D {
            position: self.position.get_slot(slot),
            rotation: self.rotation.get_slot(slot),
            scale: self.scale.get_slot(slot),
        })
    }
}

impl Component for Transform3D {
    type Storage = TransformStorage;

    fn type_name() -> &'static str {
        "Transform"
    }
}

#[cfg(test)]
mod tests {
    use engine_component::World;

    use super::*;

    #[test]
    fn test_identity_transform() {
        let t = Transform3D::IDENTITY;
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::ONE);
    }

    #[test]
    fn test_world_round_trip_through_columns() {
        let mut world = World::new();
        let e = world.create_entity();
        let t = Transform3D::from_position(Vec3::new(1.0, 2.0, 3.0));
        world.add_component(e, t).unwrap();

        assert_eq!(world.get_component::<Transform3D>(e), Some(t));
        let storage = world.storage::<Transform3D>().unwrap();
        assert_eq!(storage.position.y.of(e), 2.0);
        assert_eq!(storage.scale.z.of(e), 1.0);
    }

    #[test]
    fn test_column_write_visible_through_component() {
        let mut world = World::new();
        let e = world.create_entity();
        world.add_component(e, Transform3D::IDENTITY).unwrap();
        world.storage_mut::<Transform3D>().unwrap().position.x.set(e.slot(), 9.0);

        let t = world.get_component::<Transform3D>(e).unwrap();
        assert_eq!(t.position.x, 9.0);
    }

    #[test]
    fn test_removed_entity_columns_are_zeroed() {
        let mut world = World::new();
        let e = world.create_entity();
        world
            .add_component(e, Transform3D::from_position(Vec3::splat(4.0)))
            .unwrap();
        world.remove_entity(e, true).unwrap();

        let storage = world.storage::<Transform3D>().unwrap();
        assert_eq!(storage.position.get(e), Vec3::ZERO);
        assert_eq!(storage.scale.get(e), Vec3::ZERO);
    }
}
