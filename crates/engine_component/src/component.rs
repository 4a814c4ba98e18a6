//! Core [`Component`] trait and type identity.
//!
//! Every piece of data attached to an entity implements [`Component`]. The
//! trait names the storage the world keeps the data in: hot numeric data uses
//! a structure-of-arrays storage, everything else a dense slot storage.
//!
//! ## Type identity
//!
//! [`ComponentTypeId`] is derived from the component's **string name** using
//! FNV-1a 64-bit, so the same name yields the same id on every machine.

use crate::storage::ComponentStorage;

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// FNV-1a 64-bit hash of a UTF-8 name.
///
/// ```text
/// hash = 0xcbf29ce484222325
/// for each byte in name.as_bytes():
///     hash = hash XOR byte
///     hash = hash * 0x00000100000001b3
/// ```
#[must_use]
pub(crate) const fn fnv1a(name: &str) -> u64 {
    let bytes = name.as_bytes();
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// A unique identifier for a component type, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// Compute the id from a component's string name.
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        Self(fnv1a(name))
    }

    /// Compute the id for a Rust component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        T::component_type_id()
    }
}

/// The core component trait.
///
/// # Examples
///
/// ```rust
/// use engine_component::{Component, DenseStorage};
///
/// #[derive(Debug, Clone)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {
///     type Storage = DenseStorage<Self>;
///     fn type_name() -> &'static str { "Health" }
/// }
/// ```
pub trait Component: Sized + 'static {
    /// Where the world keeps instances of this component.
    type Storage: ComponentStorage<Item = Self>;

    /// A human-readable name for this component type.
    fn type_name() -> &'static str;

    /// Returns the [`ComponentTypeId`] for this component.
    fn component_type_id() -> ComponentTypeId {
        ComponentTypeId::from_name(Self::type_name())
    }
}
