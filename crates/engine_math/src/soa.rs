//! Vector and quaternion shapes over flat scalar columns.

use engine_component::{Entity, F32Column};
use glam::{Quat, Vec3};

/// Three columns forming a `Vec3` per entity slot.
#[derive(Debug, Clone)]
pub struct Vec3SoA {
    pub x: F32Column,
    pub y: F32Column,
    pub z: F32Column,
}

impl Vec3SoA {
    /// Columns named `<path>.x`, `<path>.y`, `<path>.z`.
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            x: F32Column::new(&format!("{path}.x")),
            y: F32Column::new(&format!("{path}.y")),
            z: F32Column::new(&format!("{path}.z")),
        }
    }

    #[must_use]
    pub fn get(&self, entity: Entity) -> Vec3 {
        let slot = entity.slot();
        Vec3::new(self.x.get(slot), self.y.get(slot), self.z.get(slot))
    }

    pub fn set(&mut self, entity: Entity, value: Vec3) {
        self.set_slot(entity.slot(), value);
    }

    pub(crate) fn get_slot(&self, slot: usize) -> Vec3 {
        Vec3::new(self.x.get(slot), self.y.get(slot), self.z.get(slot))
    }

    pub(crate) fn set_slot(&mut self, slot: usize, value: Vec3) {
        self.x.set(slot, value.x);
        self.y.set(slot, value.y);
        self.z.set(slot, value.z);
    }

    pub(crate) fn clear_slot(&mut self, slot: usize) {
        self.x.clear(slot);
        self.y.clear(slot);
        self.z.clear(slot);
    }

    /// The columns in wire order.
    #[must_use]
    pub fn columns(&self) -> [&F32Column; 3] {
        [&self.x, &self.y, &self.z]
    }

    /// The columns in wire order, mutably.
    pub fn columns_mut(&mut self) -> [&mut F32Column; 3] {
        [&mut self.x, &mut self.y, &mut self.z]
    }
}

/// Four columns forming a `Quat` per entity slot.
#[derive(Debug, Clone)]
pub struct QuatSoA {
    pub x: F32Column,
    pub y: F32Column,
    pub z: F32Column,
    pub w: F32Column,
}

impl QuatSoA {
    /// Columns named `<path>.x` through `<path>.w`.
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            x: F32Column::new(&format!("{path}.x")),
            y: F32Column::new(&format!("{path}.y")),
            z: F32Column::new(&format!("{path}.z")),
            w: F32Column::new(&format!("{path}.w")),
        }
    }

    /// Raw components; unwritten slots read as the zero quaternion, not
    /// identity.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Quat {
        self.get_slot(entity.slot())
    }

    pub fn set(&mut self, entity: Entity, value: Quat) {
        self.set_slot(entity.slot(), value);
    }

    pub(crate) fn get_slot(&self, slot: usize) -> Quat {
        Quat::from_xyzw(
            self.x.get(slot),
            self.y.get(slot),
            self.z.get(slot),
            self.w.get(slot),
        )
    }

    pub(crate) fn set_slot(&mut self, slot: usize, value: Quat) {
        self.x.set(slot, value.x);
        self.y.set(slot, value.y);
        self.z.set(slot, value.z);
        self.w.set(slot, value.w);
    }

    pub(crate) fn clear_slot(&mut self, slot: usize) {
        self.x.clear(slot);
        self.y.clear(slot);
        self.z.clear(slot);
        self.w.clear(slot);
    }

    /// The columns in wire order.
    #[must_use]
    pub fn columns(&self) -> [&F32Column; 4] {
        [&self.x, &self.y, &self.z, &self.w]
    }

    /// The columns in wire order, mutably.
    pub fn columns_mut(&mut self) -> [&mut F32Column; 4] {
        [&mut self.x, &mut self.y, &mut self.z, &mut self.w]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_round_trip_through_columns() {
        let mut soa = Vec3SoA::new("Test.position");
        let e = Entity::from_raw_parts(5, 0);
        soa.set(e, Vec3::new(1.5, 2.5, 3.5));
        assert_eq!(soa.get(e), Vec3::new(1.5, 2.5, 3.5));
        assert_eq!(soa.x.of(e), 1.5);
        assert_eq!(soa.x.len(), 6);
    }

    #[test]
    fn test_quat_unwritten_is_zero() {
        let soa = QuatSoA::new("Test.rotation");
        let q = soa.get(Entity::from_raw_parts(0, 0));
        assert_eq!(q.to_array(), [0.0; 4]);
    }

    #[test]
    fn test_column_ids_follow_path() {
        let a = QuatSoA::new("A.rotation");
        let b = QuatSoA::new("B.rotation");
        assert_ne!(a.w.id(), b.w.id());
        assert_eq!(a.w.id(), engine_component::FieldId::from_path("A.rotation.w"));
    }
}
