//! # engine_math
//!
//! Math types for the networked ECS. Re-exports [`glam`] for linear algebra
//! and defines the spatial components whose fields are stored column-wise so
//! the network codec can sync them field by field.

pub mod soa;
pub mod transform;
pub mod velocity;
pub mod xr;

// Re-export glam types for convenience.
pub use glam::{EulerRot, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

pub use soa::{QuatSoA, Vec3SoA};
pub use transform::{Transform3D, TransformStorage};
pub use velocity::{Velocity, VelocityStorage};
pub use xr::{Pose, PoseSoA, XRInputSource, XRInputSourceStorage};
