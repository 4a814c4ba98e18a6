//! # engine_component
//!
//! The "E" and "C" in ECS: entity handles, component storage and the world
//! that ties them together.
//!
//! This crate provides:
//!
//! - [`Entity`] / [`EntityAllocator`]: generation-checked, recycled handles.
//! - [`Component`]: the contract all attached data satisfies.
//! - [`F32Column`]: flat scalar columns for structure-of-arrays storage.
//! - [`DenseStorage`]: slot-indexed storage for non-numeric components.
//! - [`World`]: entity lifecycle, membership and reactive [`Query`]s.

pub mod component;
pub mod entity;
pub mod error;
pub mod query;
pub mod soa;
pub mod storage;
pub mod world;

pub use component::{Component, ComponentTypeId};
pub use entity::{Entity, EntityAllocator};
pub use error::EcsError;
pub use query::{Query, QueryDescriptor};
pub use soa::{F32Column, FieldId};
pub use storage::{ComponentStorage, DenseStorage};
pub use world::World;
