//! Linear and angular velocity component.

use engine_component::{Component, ComponentStorage};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::soa::Vec3SoA;

/// Velocity in world units per second and radians per second.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Velocity {
    pub const ZERO: Self = Self {
        linear: Vec3::ZERO,
        angular: Vec3::ZERO,
    };

    #[must_use]
    pub fn linear(linear: Vec3) -> Self {
        Self {
            linear,
            angular: Vec3::ZERO,
        }
    }
}

/// Column storage for [`Velocity`].
#[derive(Debug, Clone)]
pub struct VelocityStorage {
    pub linear: Vec3SoA,
    pub angular: Vec3SoA,
}

impl Default for VelocityStorage {
    fn default() -> Self {
        Self {
            linear: Vec3SoA::new("Velocity.linear"),
            angular: Vec3SoA::new("Velocity.angular"),
        }
    }
}

impl ComponentStorage for VelocityStorage {
    type Item = Velocity;

    fn insert(&mut self, slot: usize, item: Velocity) {
        self.linear.set_slot(slot, item.linear);
        self.angular.set_slot(slot, item.angular);
    }

    fn take(&mut self, slot: usize) -> Option<Velocity> {
        let value = self.fetch(slot);
        self.linear.clear_slot(slot);
        self.angular.clear_slot(slot);
        value
    }

    fn fetch(&self, slot: usize) -> Option<Velocity> {
        Some(Velocity {
            linear: self.linear.get_slot(slot),
            angular: self.angular.get_slot(slot),
        })
    }
}

impl Component for Velocity {
    type Storage = VelocityStorage;

    fn type_name() -> &'static str {
        "Velocity"
    }
}

#[cfg(test)]
mod tests {
    use engine_component::World;

    use super::*;

    #[test]
    fn test_velocity_round_trip() {
        let mut world = World::new();
        let e = world.create_entity();
        let v = Velocity {
            linear: Vec3::new(0.0, 0.0, 1.0),
            angular: Vec3::new(0.5, 0.0, 0.0),
        };
        world.add_component(e, v).unwrap();
        assert_eq!(world.get_component::<Velocity>(e), Some(v));
        assert_eq!(world.storage::<Velocity>().unwrap().angular.x.of(e), 0.5);
    }
}
