//! The state every system runs against.

use engine_component::World;
use engine_net::NetworkWorld;

/// What systems read and mutate: the ECS world, its network side and the
/// frame timing. One context exists per engine instance.
#[derive(Debug)]
pub struct SystemContext {
    pub world: World,
    pub network: NetworkWorld,
    /// Seconds since the previous frame.
    pub delta_seconds: f64,
    /// Seconds since the engine started.
    pub elapsed_seconds: f64,
    /// Length of one fixed step, in seconds.
    pub fixed_delta_seconds: f64,
}

impl SystemContext {
    #[must_use]
    pub fn new(world: World, network: NetworkWorld) -> Self {
        Self {
            world,
            network,
            delta_seconds: 0.0,
            elapsed_seconds: 0.0,
            fixed_delta_seconds: 1.0 / 60.0,
        }
    }

    /// The network fixed tick.
    #[must_use]
    pub fn fixed_tick(&self) -> u32 {
        self.network.fixed_tick()
    }
}
