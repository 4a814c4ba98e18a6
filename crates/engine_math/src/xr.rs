//! Tracked XR input poses: the rig container, the head and both hands.

use engine_component::{Component, ComponentStorage};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::soa::{QuatSoA, Vec3SoA};

/// A position and orientation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Every tracked pose of an XR user.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct XRInputSource {
    pub container: Pose,
    pub head: Pose,
    pub controller_left: Pose,
    pub controller_grip_left: Pose,
    pub controller_right: Pose,
    pub controller_grip_right: Pose,
}

impl XRInputSource {
    fn poses(&self) -> [Pose; 6] {
        [
            self.container,
            self.head,
            self.controller_left,
            self.controller_grip_left,
            self.controller_right,
            self.controller_grip_right,
        ]
    }
}

/// Columns for one pose.
#[derive(Debug, Clone)]
pub struct PoseSoA {
    pub position: Vec3SoA,
    pub rotation: QuatSoA,
}

impl PoseSoA {
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            position: Vec3SoA::new(&format!("{path}.position")),
            rotation: QuatSoA::new(&format!("{path}.rotation")),
        }
    }

    fn get_slot(&self, slot: usize) -> Pose {
        Pose {
            position: self.position.get_slot(slot),
            rotation: self.rotation.get_slot(slot),
        }
    }

    fn set_slot(&mut self, slot: usize, pose: Pose) {
        self.position.set_slot(slot, pose.position);
        self.rotation.set_slot(slot, pose.rotation);
    }

    fn clear_slot(&mut self, slot: usize) {
        self.position.clear_slot(slot);
        self.rotation.clear_slot(slot);
    }
}

/// Column storage for [`XRInputSource`].
#[derive(Debug, Clone)]
pub struct XRInputSourceStorage {
    pub container: PoseSoA,
    pub head: PoseSoA,
    pub controller_left: PoseSoA,
    pub controller_grip_left: PoseSoA,
    pub controller_right: PoseSoA,
    pub controller_grip_right: PoseSoA,
}

impl XRInputSourceStorage {
    /// The poses in wire order: container, head, left, grip left, right,
    /// grip right.
    #[must_use]
    pub fn poses(&self) -> [&PoseSoA; 6] {
        [
            &self.container,
            &self.head,
            &self.controller_left,
            &self.controller_grip_left,
            &self.controller_right,
            &self.controller_grip_right,
        ]
    }

    /// The poses in wire order, mutably.
    pub fn poses_mut(&mut self) -> [&mut PoseSoA; 6] {
        [
            &mut self.container,
            &mut self.head,
            &mut self.controller_left,
            &mut self.controller_grip_left,
            &mut self.controller_right,
            &mut self.controller_grip_right,
        ]
    }
}

impl Default for XRInputSourceStorage {
    fn default() -> Self {
        Self {
            container: PoseSoA::new("XRInputSource.container"),
            head: PoseSoA::new("XRInputSource.head"),
            controller_left: PoseSoA::new("XRInputSource.controllerLeft"),
            controller_grip_left: PoseSoA::new("XRInputSource.controllerGripLeft"),
            controller_right: PoseSoA::new("XRInputSource.controllerRight"),
            controller_grip_right: PoseSoA::new("XRInputSource.controllerGripRight"),
        }
    }
}

impl ComponentStorage for XRInputSourceStorage {
    type Item = XRInputSource;

    fn insert(&mut self, slot: usize, item: XRInputSource) {
        for (soa, pose) in self.poses_mut().into_iter().zip(item.poses()) {
            soa.set_slot(slot, pose);
        }
    }

    fn take(&mut self, slot: usize) -> Option<XRInputSource> {
        let value = self.fetch(slot);
        for soa in self.poses_mut() {
            soa.clear_slot(slot);
        }
        value
    }

    fn fetch(&self, slot: usize) -> Option<XRInputSource> {
        Some(XRInputSource {
            container: self.container.get_slot(slot),
            head: self.head.get_slot(slot),
            controller_left: self.controller_left.get_slot(slot),
            controller_grip_left: self.controller_grip_left.get_slot(slot),
            controller_right: self.controller_right.get_slot(slot),
            controller_grip_right: self.controller_grip_right.get_slot(slot),
        })
    }
}

impl Component for XRInputSource {
    type Storage = XRInputSourceStorage;

    fn type_name() -> &'static str {
        "XRInputSource"
    }
}

#[cfg(test)]
mod tests {
    use engine_component::World;

    use super::*;

    #[test]
    fn test_xr_round_trip() {
        let mut world = World::new();
        let e = world.create_entity();
        let mut xr = XRInputSource::default();
        xr.head.position = Vec3::new(0.0, 1.7, 0.0);
        xr.controller_grip_right.rotation = Quat::from_rotation_y(1.0);
        world.add_component(e, xr).unwrap();

        assert_eq!(world.get_component::<XRInputSource>(e), Some(xr));
        let storage = world.storage::<XRInputSource>().unwrap();
        assert_eq!(storage.poses()[1].position.y.of(e), 1.7);
    }

    #[test]
    fn test_pose_columns_are_distinct() {
        let storage = XRInputSourceStorage::default();
        let ids: std::collections::HashSet<_> = storage
            .poses()
            .iter()
            .flat_map(|p| p.position.columns().map(|c| c.id()))
            .collect();
        assert_eq!(ids.len(), 18);
    }
}
