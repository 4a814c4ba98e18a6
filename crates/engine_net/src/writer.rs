//! Change-masked state packets.
//!
//! Every level of the packet follows the same shape: reserve a change mask,
//! attempt each child, set one bit per child that wrote something, then
//! either patch the mask in or rewind as if nothing had been attempted. A
//! field is written only if it differs from what this writer last sent,
//! except on heartbeat ticks when every present field is written.
//!
//! ```text
//! userIndex u32 | fixedTick u32 | count u32 | entity*
//! entity    = networkId u32 | mask u8 | Transform? | Velocity? | XRInputs?
//! ```

use engine_component::{Component, Entity, F32Column, FieldId, World};
use engine_math::{QuatSoA, Transform3D, Vec3SoA, Velocity, XRInputSource};
use tracing::trace;

use crate::config::NetworkConfig;
use crate::cursor::{ChangeMask, ViewCursor};
use crate::error::NetError;
use crate::network::{NetworkId, NetworkObject, NetworkWorld};
use crate::shadow::ShadowCache;

/// Bit of the entity mask set when a Transform record follows.
pub const ENTITY_TRANSFORM: u8 = 1 << 0;
/// Bit of the entity mask set when a Velocity record follows.
pub const ENTITY_VELOCITY: u8 = 1 << 1;
/// Bit of the entity mask set when an XR inputs record follows.
pub const ENTITY_XR_INPUTS: u8 = 1 << 2;

/// Writes state packets for one output stream.
#[derive(Debug)]
pub struct DataWriter {
    cursor: ViewCursor,
    shadows: ShadowCache,
    heartbeat_interval: u32,
    force: bool,
    /// Shadow updates held back until the packet being built is complete.
    staged: Option<Vec<(FieldId, Entity, f32)>>,
}

impl DataWriter {
    #[must_use]
    pub fn new(config: &NetworkConfig) -> Self {
        Self::with_capacity(config.writer_capacity, config.heartbeat_interval)
    }

    /// A writer with a `capacity`-byte buffer. A `heartbeat_interval` of 0
    /// disables heartbeats.
    #[must_use]
    pub fn with_capacity(capacity: usize, heartbeat_interval: u32) -> Self {
        Self {
            cursor: ViewCursor::new(capacity),
            shadows: ShadowCache::new(),
            heartbeat_interval,
            force: false,
            staged: None,
        }
    }

    #[must_use]
    pub fn cursor(&self) -> &ViewCursor {
        &self.cursor
    }

    #[must_use]
    pub fn shadows(&self) -> &ShadowCache {
        &self.shadows
    }

    /// When set, every present field is written regardless of the shadow
    /// cache. [`write`](Self::write) manages this itself.
    pub fn set_force(&mut self, force: bool) {
        self.force = force;
    }

    /// The bytes written since the last take, resetting the cursor.
    pub fn take_written(&mut self) -> Vec<u8> {
        self.cursor.take_written()
    }

    #[must_use]
    pub fn is_heartbeat(&self, fixed_tick: u32) -> bool {
        self.heartbeat_interval != 0 && fixed_tick % self.heartbeat_interval == 0
    }

    // ── Fields ──────────────────────────────────────────────────────────────

    /// Writes the entity's value in `column` if it differs from the value
    /// last written by this writer.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Cursor`] if the buffer is full.
    pub fn write_prop_if_changed(&mut self, column: &F32Column, entity: Entity) -> Result<bool, NetError> {
        let value = column.of(entity);
        if !self.force && self.shadows.is_current(column.id(), entity, value) {
            return Ok(false);
        }
        self.cursor.write_f32(value)?;
        match &mut self.staged {
            Some(staged) => staged.push((column.id(), entity, value)),
            None => self.shadows.record(column.id(), entity, value),
        }
        Ok(true)
    }

    fn write_masked<M: ChangeMask>(&mut self, columns: &[&F32Column], entity: Entity) -> Result<bool, NetError> {
        let record = self.cursor.begin_record::<M>()?;
        let mut mask = M::default();
        for (bit, column) in (0u32..).zip(columns) {
            if self.write_prop_if_changed(column, entity)? {
                mask = mask | M::bit(bit);
            }
        }
        Ok(self.cursor.end_record(record, mask))
    }

    /// # Errors
    ///
    /// Returns [`NetError::Cursor`] if the buffer is full.
    pub fn write_vector3(&mut self, vector: &Vec3SoA, entity: Entity) -> Result<bool, NetError> {
        self.write_masked::<u8>(&vector.columns(), entity)
    }

    /// # Errors
    ///
    /// Returns [`NetError::Cursor`] if the buffer is full.
    pub fn write_vector4(&mut self, quat: &QuatSoA, entity: Entity) -> Result<bool, NetError> {
        self.write_masked::<u8>(&quat.columns(), entity)
    }

    /// Writes an arbitrary flat component with the narrowest mask that
    /// covers its columns.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::TooManyFields`] for more than 64 columns, or
    /// [`NetError::Cursor`] if the buffer is full.
    pub fn write_component(&mut self, columns: &[&F32Column], entity: Entity) -> Result<bool, NetError> {
        match columns.len() {
            0..=8 => self.write_masked::<u8>(columns, entity),
            9..=16 => self.write_masked::<u16>(columns, entity),
            17..=32 => self.write_masked::<u32>(columns, entity),
            33..=64 => self.write_masked::<u64>(columns, entity),
            n => Err(NetError::TooManyFields(n)),
        }
    }

    // ── Components ──────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns [`NetError::Cursor`] if the buffer is full.
    pub fn write_position(&mut self, world: &World, entity: Entity) -> Result<bool, NetError> {
        match present::<Transform3D>(world, entity) {
            Some(storage) => self.write_vector3(&storage.position, entity),
            None => Ok(false),
        }
    }

    /// # Errors
    ///
    /// Returns [`NetError::Cursor`] if the buffer is full.
    pub fn write_rotation(&mut self, world: &World, entity: Entity) -> Result<bool, NetError> {
        match present::<Transform3D>(world, entity) {
            Some(storage) => self.write_vector4(&storage.rotation, entity),
            None => Ok(false),
        }
    }

    /// Position then rotation under a u8 mask.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Cursor`] if the buffer is full.
    pub fn write_transform(&mut self, world: &World, entity: Entity) -> Result<bool, NetError> {
        if present::<Transform3D>(world, entity).is_none() {
            return Ok(false);
        }
        let record = self.cursor.begin_record::<u8>()?;
        let mut mask = 0u8;
        if self.write_position(world, entity)? {
            mask |= 1 << 0;
        }
        if self.write_rotation(world, entity)? {
            mask |= 1 << 1;
        }
        Ok(self.cursor.end_record(record, mask))
    }

    /// Linear then angular under a u8 mask.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Cursor`] if the buffer is full.
    pub fn write_velocity(&mut self, world: &World, entity: Entity) -> Result<bool, NetError> {
        let Some(storage) = present::<Velocity>(world, entity) else {
            return Ok(false);
        };
        let record = self.cursor.begin_record::<u8>()?;
        let mut mask = 0u8;
        if self.write_vector3(&storage.linear, entity)? {
            mask |= 1 << 0;
        }
        if self.write_vector3(&storage.angular, entity)? {
            mask |= 1 << 1;
        }
        Ok(self.cursor.end_record(record, mask))
    }

    /// Twelve pose records (position and rotation of each of the six poses)
    /// under a u16 mask.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Cursor`] if the buffer is full.
    pub fn write_xr_inputs(&mut self, world: &World, entity: Entity) -> Result<bool, NetError> {
        let Some(storage) = present::<XRInputSource>(world, entity) else {
            return Ok(false);
        };
        let record = self.cursor.begin_record::<u16>()?;
        let mut mask = 0u16;
        for (pose_index, pose) in (0u32..).zip(storage.poses()) {
            if self.write_vector3(&pose.position, entity)? {
                mask |= u16::bit(pose_index * 2);
            }
            if self.write_vector4(&pose.rotation, entity)? {
                mask |= u16::bit(pose_index * 2 + 1);
            }
        }
        Ok(self.cursor.end_record(record, mask))
    }

    // ── Entities ────────────────────────────────────────────────────────────

    /// One entity record. Leaves no bytes if nothing changed.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Cursor`] if the buffer is full.
    pub fn write_entity(&mut self, world: &World, network_id: NetworkId, entity: Entity) -> Result<bool, NetError> {
        let start = self.cursor.mark();
        self.cursor.write_u32(network_id.0)?;
        let record = self.cursor.begin_record::<u8>()?;
        let mut mask = 0u8;
        if self.write_transform(world, entity)? {
            mask |= ENTITY_TRANSFORM;
        }
        if self.write_velocity(world, entity)? {
            mask |= ENTITY_VELOCITY;
        }
        if self.write_xr_inputs(world, entity)? {
            mask |= ENTITY_XR_INPUTS;
        }
        if self.cursor.end_record(record, mask) {
            Ok(true)
        } else {
            self.cursor.rewind(start);
            Ok(false)
        }
    }

    /// A count followed by one record per changed entity. Entities without a
    /// [`NetworkObject`] are skipped. If no entity wrote a record the whole
    /// buffer is reset, header included. Returns the record count.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Cursor`] if the buffer is full.
    pub fn write_entities(&mut self, world: &World, entities: &[Entity]) -> Result<u32, NetError> {
        let count_slot = self.cursor.space::<u32>()?;
        let mut count = 0u32;
        for &entity in entities {
            let Some(object) = world.component::<NetworkObject>(entity) else {
                continue;
            };
            if self.write_entity(world, object.network_id, entity)? {
                count += 1;
            }
        }
        if count == 0 {
            self.cursor.reset();
        } else {
            self.cursor.patch(count_slot, count);
        }
        Ok(count)
    }

    /// A complete packet for the local user at the current fixed tick. Empty
    /// when nothing changed, including on heartbeat ticks with no entities.
    /// A failed write leaves the shadow cache untouched.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::UnknownUser`] if the local user has no index yet,
    /// or [`NetError::Cursor`] if the buffer is full.
    pub fn write(&mut self, world: &World, network: &NetworkWorld, entities: &[Entity]) -> Result<Vec<u8>, NetError> {
        let user_id = network.user_id();
        let user_index = network
            .user_index(user_id)
            .ok_or_else(|| NetError::UnknownUser(user_id.clone()))?;
        let fixed_tick = network.fixed_tick();

        self.cursor.reset();
        self.force = self.is_heartbeat(fixed_tick);
        self.staged = Some(Vec::new());
        let result = self.write_header_and_entities(world, user_index, fixed_tick, entities);
        self.force = false;
        let staged = self.staged.take().unwrap_or_default();

        let count = match result {
            Ok(count) => count,
            Err(e) => {
                self.cursor.reset();
                return Err(e);
            }
        };
        for (field, entity, value) in staged {
            self.shadows.record(field, entity, value);
        }
        let packet = self.cursor.take_written();
        trace!(tick = fixed_tick, entities = count, bytes = packet.len(), "state packet written");
        Ok(packet)
    }

    fn write_header_and_entities(
        &mut self,
        world: &World,
        user_index: u32,
        fixed_tick: u32,
        entities: &[Entity],
    ) -> Result<u32, NetError> {
        self.cursor.write_u32(user_index)?;
        self.cursor.write_u32(fixed_tick)?;
        self.write_entities(world, entities)
    }
}

/// The storage of `T` if the entity has a `T`.
fn present<T: Component>(world: &World, entity: Entity) -> Option<&T::Storage> {
    if world.has_component::<T>(entity) {
        world.storage::<T>()
    } else {
        None
    }
}
