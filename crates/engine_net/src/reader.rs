//! Applies state packets produced by [`DataWriter`](crate::DataWriter).
//!
//! Records are applied field by field: a field whose bit is clear keeps its
//! current value. Records for objects this machine does not know, or for
//! which it holds authority, are still parsed in full so the cursor stays
//! aligned with the next record.

use engine_component::{Entity, F32Column, World};
use engine_math::{QuatSoA, Transform3D, Vec3SoA, Velocity, XRInputSource};
use tracing::{debug, trace};

use crate::cursor::{ChangeMask, ViewCursor};
use crate::error::NetError;
use crate::network::{NetworkId, NetworkObjectAuthorityTag, NetworkWorld, UserId};
use crate::writer::{ENTITY_TRANSFORM, ENTITY_VELOCITY, ENTITY_XR_INPUTS};

/// Returns `true` if every bit of `flag` is set in `mask`.
#[must_use]
pub fn check_bitflag<M: ChangeMask>(mask: M, flag: M) -> bool {
    (mask & flag) == flag
}

/// What one packet did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Sender index from the packet header.
    pub user_index: Option<u32>,
    pub applied: u32,
    pub discarded: u32,
}

// ── Fields ──────────────────────────────────────────────────────────────────

fn read_masked<M: ChangeMask, B: AsRef<[u8]>>(
    cursor: &mut ViewCursor<B>,
    columns: &mut [&mut F32Column],
    entity: Entity,
) -> Result<M, NetError> {
    let mask: M = cursor.read()?;
    for (bit, column) in (0u32..).zip(columns.iter_mut()) {
        if check_bitflag(mask, M::bit(bit)) {
            column.set(entity.slot(), cursor.read_f32()?);
        }
    }
    Ok(mask)
}

fn skip_masked<M: ChangeMask, B: AsRef<[u8]>>(cursor: &mut ViewCursor<B>, fields: u32) -> Result<M, NetError> {
    let mask: M = cursor.read()?;
    for bit in 0..fields {
        if check_bitflag(mask, M::bit(bit)) {
            cursor.read_f32()?;
        }
    }
    Ok(mask)
}

/// # Errors
///
/// Returns [`NetError::Cursor`] if the packet ends early.
pub fn read_vector3<B: AsRef<[u8]>>(
    cursor: &mut ViewCursor<B>,
    vector: &mut Vec3SoA,
    entity: Entity,
) -> Result<u8, NetError> {
    read_masked(cursor, &mut vector.columns_mut(), entity)
}

/// # Errors
///
/// Returns [`NetError::Cursor`] if the packet ends early.
pub fn read_vector4<B: AsRef<[u8]>>(
    cursor: &mut ViewCursor<B>,
    quat: &mut QuatSoA,
    entity: Entity,
) -> Result<u8, NetError> {
    read_masked(cursor, &mut quat.columns_mut(), entity)
}

/// Counterpart of [`DataWriter::write_component`](crate::DataWriter::write_component).
///
/// # Errors
///
/// Returns [`NetError::TooManyFields`] for more than 64 columns, or
/// [`NetError::Cursor`] if the packet ends early.
pub fn read_component<B: AsRef<[u8]>>(
    cursor: &mut ViewCursor<B>,
    columns: &mut [&mut F32Column],
    entity: Entity,
) -> Result<bool, NetError> {
    let changed = match columns.len() {
        0..=8 => !read_masked::<u8, _>(cursor, columns, entity)?.is_empty(),
        9..=16 => !read_masked::<u16, _>(cursor, columns, entity)?.is_empty(),
        17..=32 => !read_masked::<u32, _>(cursor, columns, entity)?.is_empty(),
        33..=64 => !read_masked::<u64, _>(cursor, columns, entity)?.is_empty(),
        n => return Err(NetError::TooManyFields(n)),
    };
    Ok(changed)
}

// ── Components ──────────────────────────────────────────────────────────────

/// # Errors
///
/// Returns [`NetError::Cursor`] if the packet ends early.
pub fn read_transform<B: AsRef<[u8]>>(
    cursor: &mut ViewCursor<B>,
    world: &mut World,
    entity: Entity,
) -> Result<(), NetError> {
    let mask = cursor.read_u8()?;
    let storage = world.storage_mut::<Transform3D>()?;
    if check_bitflag(mask, 1 << 0) {
        read_vector3(cursor, &mut storage.position, entity)?;
    }
    if check_bitflag(mask, 1 << 1) {
        read_vector4(cursor, &mut storage.rotation, entity)?;
    }
    Ok(())
}

/// # Errors
///
/// Returns [`NetError::Cursor`] if the packet ends early.
pub fn read_velocity<B: AsRef<[u8]>>(
    cursor: &mut ViewCursor<B>,
    world: &mut World,
    entity: Entity,
) -> Result<(), NetError> {
    let mask = cursor.read_u8()?;
    let storage = world.storage_mut::<Velocity>()?;
    if check_bitflag(mask, 1 << 0) {
        read_vector3(cursor, &mut storage.linear, entity)?;
    }
    if check_bitflag(mask, 1 << 1) {
        read_vector3(cursor, &mut storage.angular, entity)?;
    }
    Ok(())
}

/// # Errors
///
/// Returns [`NetError::Cursor`] if the packet ends early.
pub fn read_xr_inputs<B: AsRef<[u8]>>(
    cursor: &mut ViewCursor<B>,
    world: &mut World,
    entity: Entity,
) -> Result<(), NetError> {
    let mask = cursor.read_u16()?;
    let storage = world.storage_mut::<XRInputSource>()?;
    for (pose_index, pose) in (0u32..).zip(storage.poses_mut()) {
        if check_bitflag(mask, u16::bit(pose_index * 2)) {
            read_vector3(cursor, &mut pose.position, entity)?;
        }
        if check_bitflag(mask, u16::bit(pose_index * 2 + 1)) {
            read_vector4(cursor, &mut pose.rotation, entity)?;
        }
    }
    Ok(())
}

fn skip_pair<B: AsRef<[u8]>>(cursor: &mut ViewCursor<B>, first: u32, second: u32) -> Result<(), NetError> {
    let mask = cursor.read_u8()?;
    if check_bitflag(mask, 1 << 0) {
        skip_masked::<u8, _>(cursor, first)?;
    }
    if check_bitflag(mask, 1 << 1) {
        skip_masked::<u8, _>(cursor, second)?;
    }
    Ok(())
}

fn skip_xr_inputs<B: AsRef<[u8]>>(cursor: &mut ViewCursor<B>) -> Result<(), NetError> {
    let mask = cursor.read_u16()?;
    for bit in 0..12 {
        if check_bitflag(mask, u16::bit(bit)) {
            let fields = if bit % 2 == 0 { 3 } else { 4 };
            skip_masked::<u8, _>(cursor, fields)?;
        }
    }
    Ok(())
}

// ── Entities ────────────────────────────────────────────────────────────────

/// Reads one entity record sent by `sender`. The record is applied only if
/// it resolves to a local entity this machine is not authoritative for;
/// otherwise it is parsed and dropped. Returns whether it was applied.
///
/// # Errors
///
/// Returns [`NetError::Cursor`] if the packet ends early.
pub fn read_entity<B: AsRef<[u8]>>(
    cursor: &mut ViewCursor<B>,
    world: &mut World,
    network: &NetworkWorld,
    sender: Option<&UserId>,
) -> Result<bool, NetError> {
    let network_id = NetworkId(cursor.read_u32()?);
    let mask = cursor.read_u8()?;

    let target = sender
        .and_then(|owner| network.get_network_object(world, owner, network_id))
        .filter(|&entity| !world.has_component::<NetworkObjectAuthorityTag>(entity));

    let Some(entity) = target else {
        trace!(%network_id, "discarding record");
        if check_bitflag(mask, ENTITY_TRANSFORM) {
            skip_pair(cursor, 3, 4)?;
        }
        if check_bitflag(mask, ENTITY_VELOCITY) {
            skip_pair(cursor, 3, 3)?;
        }
        if check_bitflag(mask, ENTITY_XR_INPUTS) {
            skip_xr_inputs(cursor)?;
        }
        return Ok(false);
    };

    // Records for components the local entity lacks are skipped so their
    // columns never hold data the world does not track.
    if check_bitflag(mask, ENTITY_TRANSFORM) {
        if world.has_component::<Transform3D>(entity) {
            read_transform(cursor, world, entity)?;
        } else {
            skip_pair(cursor, 3, 4)?;
        }
    }
    if check_bitflag(mask, ENTITY_VELOCITY) {
        if world.has_component::<Velocity>(entity) {
            read_velocity(cursor, world, entity)?;
        } else {
            skip_pair(cursor, 3, 3)?;
        }
    }
    if check_bitflag(mask, ENTITY_XR_INPUTS) {
        if world.has_component::<XRInputSource>(entity) {
            read_xr_inputs(cursor, world, entity)?;
        } else {
            skip_xr_inputs(cursor)?;
        }
    }
    Ok(true)
}

/// Reads a count followed by that many entity records.
///
/// # Errors
///
/// Returns [`NetError::Cursor`] if the packet ends early.
pub fn read_entities<B: AsRef<[u8]>>(
    cursor: &mut ViewCursor<B>,
    world: &mut World,
    network: &NetworkWorld,
    sender: Option<&UserId>,
) -> Result<ReadStats, NetError> {
    let count = cursor.read_u32()?;
    let mut stats = ReadStats::default();
    for _ in 0..count {
        if read_entity(cursor, world, network, sender)? {
            stats.applied += 1;
        } else {
            stats.discarded += 1;
        }
    }
    Ok(stats)
}

/// Applies incoming state packets.
#[derive(Debug, Default)]
pub struct DataReader {
    totals: ReadStats,
}

impl DataReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records applied and discarded over the reader's lifetime.
    #[must_use]
    pub fn totals(&self) -> ReadStats {
        self.totals
    }

    /// Applies one packet. A zero-length packet means nothing changed.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Cursor`] for truncated packets. Records read
    /// before the truncation stay applied.
    pub fn read(&mut self, world: &mut World, network: &NetworkWorld, packet: &[u8]) -> Result<ReadStats, NetError> {
        if packet.is_empty() {
            return Ok(ReadStats::default());
        }

        let mut cursor = ViewCursor::wrap(packet);
        let user_index = cursor.read_u32()?;
        let fixed_tick = cursor.read_u32()?;
        let sender = network.user_id_for_index(user_index);
        if sender.is_none() {
            debug!(user_index, tick = fixed_tick, "packet from unknown user index");
        }

        let mut stats = ReadStats {
            user_index: Some(user_index),
            ..ReadStats::default()
        };
        while cursor.remaining() > 0 {
            let batch = read_entities(&mut cursor, world, network, sender)?;
            stats.applied += batch.applied;
            stats.discarded += batch.discarded;
        }

        self.totals.applied += stats.applied;
        self.totals.discarded += stats.discarded;
        trace!(
            user_index,
            tick = fixed_tick,
            bytes = packet.len(),
            applied = stats.applied,
            discarded = stats.discarded,
            "state packet read"
        );
        Ok(stats)
    }
}
