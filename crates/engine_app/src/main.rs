//! # engine_app: Coordinator
//!
//! Runs a host and a guest engine in one process, linked by an in-process
//! channel transport. Each side owns one avatar and mirrors the other.
//!
//! ## Startup Sequence
//!
//! 1. Load [`EngineConfig`] from the file named by `ENGINE_CONFIG`.
//! 2. Build both engines with the built-in network systems.
//! 3. The host admits both users; each side spawns its avatar.
//! 4. Run the fixed-timestep loop for `max_ticks` frames (0 = until Ctrl-C).

mod config;
mod systems;
mod tick;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine_math::{Transform3D, Vec3};
use engine_net::{
    AVATAR_PREFAB, ChannelTransport, DEFAULT_MAX_NEARBY_USERS, NetworkObject, NetworkWorldAction, UserId,
};

use config::EngineConfig;
use tick::TickLoop;

fn spawn_avatar(tick_loop: &mut TickLoop, position: Vec3) {
    let network = &mut tick_loop.ctx_mut().network;
    let network_id = network.allocate_network_id();
    let object = NetworkObject::new(network.user_id().clone(), network_id, AVATAR_PREFAB);
    network.dispatch_action(NetworkWorldAction::SpawnObject {
        object,
        transform: Transform3D::from_position(position),
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    let config = EngineConfig::load()?;
    info!(tick_rate = config.tick_rate, max_ticks = config.max_ticks, "engine coordinator starting");

    let host_id = UserId::new_random();
    let guest_id = UserId::new_random();
    let (host_link, guest_link) = ChannelTransport::pair();

    let mut host = TickLoop::start(
        &config,
        host_id.clone(),
        true,
        Box::new(host_link),
        vec![systems::wander()],
    )
    .await;
    let mut guest = TickLoop::start(
        &config,
        guest_id.clone(),
        false,
        Box::new(guest_link),
        vec![systems::wander()],
    )
    .await;

    let network = &mut host.ctx_mut().network;
    network.admit_client(host_id.clone(), "host");
    network.admit_client(guest_id.clone(), "guest");
    spawn_avatar(&mut host, Vec3::ZERO);
    spawn_avatar(&mut guest, Vec3::new(2.0, 0.0, 2.0));

    let mut loops = [host, guest];
    tick::run(&mut loops, config.tick_rate, config.max_ticks).await;

    let [host, guest] = &loops;
    for nearby in host
        .ctx()
        .network
        .get_nearby_users(&host.ctx().world, &host_id, DEFAULT_MAX_NEARBY_USERS)
    {
        info!(user_id = %nearby.user_id, distance = nearby.distance, "near the host");
    }
    info!(
        host_objects = host.ctx().network.network_objects().count(),
        guest_objects = guest.ctx().network.network_objects().count(),
        fixed_tick = host.ctx().fixed_tick(),
        "engine coordinator shut down"
    );
    Ok(())
}
