//! Built-in systems that move state between the world and the transport.
//!
//! Registration order matters within a stage: incoming packets are drained
//! before incoming actions are applied, and clients are validated before the
//! outgoing actions are flushed so a `DestroyClient` leaves the same tick.

use std::time::Instant;

use engine_component::QueryDescriptor;
use engine_math::{Transform3D, Vec3, Velocity};
use engine_net::{
    DataReader, DataWriter, Message, NetworkObject, NetworkObjectAuthorityTag, NetworkWorldAction, UserId,
    decode_actions, encode_actions,
};
use engine_system::{SystemConfig, SystemContext, SystemModule, SystemUpdateType};
use tracing::{debug, info, trace, warn};

/// Every built-in network system, in registration order.
#[must_use]
pub fn network_systems() -> Vec<SystemModule> {
    vec![
        incoming_network_state(),
        incoming_actions(),
        client_validation(),
        outgoing_actions(),
        outgoing_network_state(),
    ]
}

/// Drains the transport: state packets go to the reader, action batches to
/// the incoming queue. A malformed message is dropped on its own.
///
/// Either kind of message counts as hearing from the peer. Action batches
/// carry no sender, so the peer is the user last named by a state header on
/// this transport.
#[must_use]
pub fn incoming_network_state() -> SystemModule {
    let config = SystemConfig::new("incoming_network_state", SystemUpdateType::FixedEarly);
    SystemModule::from_fn(config, |_| {
        let mut reader = DataReader::new();
        let mut peer: Option<UserId> = None;
        Ok(move |ctx: &mut SystemContext| {
            let SystemContext { world, network, .. } = ctx;

            let mut inbox = Vec::new();
            if let Some(transport) = network.transport_mut() {
                while let Some(message) = transport.try_recv() {
                    inbox.push(message);
                }
            }

            for message in inbox {
                match message {
                    Message::Data(packet) => match reader.read(world, network, &packet) {
                        Ok(stats) => {
                            let sender = stats
                                .user_index
                                .and_then(|index| network.user_id_for_index(index))
                                .cloned();
                            if let Some(sender) = sender {
                                network.touch_client(&sender, Instant::now());
                                peer = Some(sender);
                            }
                        }
                        Err(e) => warn!(error = %e, bytes = packet.len(), "dropping malformed state packet"),
                    },
                    Message::Actions(batch) => match decode_actions(&batch) {
                        Ok(actions) => {
                            trace!(count = actions.len(), "received actions");
                            if let Some(sender) = &peer {
                                network.touch_client(sender, Instant::now());
                            }
                            network.receive_actions(actions);
                        }
                        Err(e) => warn!(error = %e, bytes = batch.len(), "dropping malformed action batch"),
                    },
                }
            }
            Ok(())
        })
    })
}

#[must_use]
pub fn incoming_actions() -> SystemModule {
    let config = SystemConfig::new("incoming_actions", SystemUpdateType::FixedEarly);
    SystemModule::from_fn(config, |_| {
        Ok(|ctx: &mut SystemContext| {
            let applied = ctx.network.apply_incoming_actions(&mut ctx.world);
            if applied > 0 {
                trace!(applied, tick = ctx.fixed_tick(), "applied incoming actions");
            }
            Ok(())
        })
    })
}

/// Hosts drop clients that have gone quiet.
#[must_use]
pub fn client_validation() -> SystemModule {
    let config = SystemConfig::new("client_validation", SystemUpdateType::FixedLate);
    SystemModule::from_fn(config, |_| {
        Ok(|ctx: &mut SystemContext| {
            if ctx.network.is_hosting() {
                ctx.network.validate_network_objects(Instant::now());
            }
            Ok(())
        })
    })
}

/// Flushes the outgoing action queue. Hosts also broadcast their fixed tick
/// every `time_sync_interval` ticks.
#[must_use]
pub fn outgoing_actions() -> SystemModule {
    let config = SystemConfig::new("outgoing_actions", SystemUpdateType::FixedLate);
    SystemModule::from_fn(config, |_| {
        let mut last_time_sync = 0u32;
        Ok(move |ctx: &mut SystemContext| {
            let network = &mut ctx.network;
            let fixed_tick = network.fixed_tick();
            if network.is_hosting() && fixed_tick.wrapping_sub(last_time_sync) > network.config().time_sync_interval {
                debug!(fixed_tick, "broadcasting time sync");
                network.dispatch_action(NetworkWorldAction::TimeSync { fixed_tick });
                last_time_sync = fixed_tick;
            }

            let actions = network.take_outgoing_actions();
            if actions.is_empty() {
                return Ok(());
            }
            let batch = encode_actions(&actions)?;
            if let Some(transport) = network.transport_mut() {
                transport.send(Message::Actions(batch))?;
            }
            Ok(())
        })
    })
}

/// Writes every network object this machine holds authority for.
#[must_use]
pub fn outgoing_network_state() -> SystemModule {
    let config = SystemConfig::new("outgoing_network_state", SystemUpdateType::FixedLate);
    SystemModule::from_fn(config, |ctx| {
        let owned = ctx.world.define_query(
            QueryDescriptor::new()
                .with::<NetworkObject>()
                .with::<NetworkObjectAuthorityTag>(),
        );
        let mut writer = DataWriter::new(ctx.network.config());
        Ok(move |ctx: &mut SystemContext| {
            // Nothing can be addressed until the host has assigned an index.
            if ctx.network.user_index(ctx.network.user_id()).is_none() {
                return Ok(());
            }
            let entities = owned.matches(&ctx.world);
            let packet = writer.write(&ctx.world, &ctx.network, &entities)?;
            if packet.is_empty() {
                return Ok(());
            }
            trace!(bytes = packet.len(), tick = ctx.fixed_tick(), "sending state");
            if let Some(transport) = ctx.network.transport_mut() {
                transport.send(Message::Data(packet))?;
            }
            Ok(())
        })
    })
}

/// Walking speed of [`wander`], in metres per second.
pub const WANDER_SPEED: f32 = 1.5;

/// Scene system that gives each owned object a heading and moves it along.
#[must_use]
pub fn wander() -> SystemModule {
    let config = SystemConfig::new("wander", SystemUpdateType::Fixed).scene();
    SystemModule::from_fn(config, |ctx| {
        let owned = ctx.world.define_query(
            QueryDescriptor::new()
                .with::<NetworkObject>()
                .with::<NetworkObjectAuthorityTag>()
                .with::<Transform3D>(),
        );
        Ok(move |ctx: &mut SystemContext| {
            for entity in owned.enter(&mut ctx.world) {
                let angle = entity.index() as f32 * 1.3;
                let heading = Vec3::new(angle.cos(), 0.0, angle.sin()) * WANDER_SPEED;
                ctx.world.add_component(entity, Velocity::linear(heading))?;
                info!(%entity, "object started wandering");
            }

            let dt = ctx.fixed_delta_seconds as f32;
            for entity in owned.matches(&ctx.world) {
                let Some(velocity) = ctx.world.get_component::<Velocity>(entity) else {
                    continue;
                };
                let position = &mut ctx.world.storage_mut::<Transform3D>()?.position;
                let next = position.get(entity) + velocity.linear * dt;
                position.set(entity, next);
            }
            Ok(())
        })
    })
}
