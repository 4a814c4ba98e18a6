//! System and pipeline configuration.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// The stage a system runs in. Stages execute in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SystemUpdateType {
    /// Once per frame, before the fixed steps.
    Update,
    /// Start of every fixed step: incoming network state and actions.
    FixedEarly,
    /// Simulation.
    Fixed,
    /// End of every fixed step: outgoing network state and actions.
    FixedLate,
    PreRender,
    PostRender,
}

impl SystemUpdateType {
    /// Every stage in execution order.
    pub const ALL: [Self; 6] = [
        Self::Update,
        Self::FixedEarly,
        Self::Fixed,
        Self::FixedLate,
        Self::PreRender,
        Self::PostRender,
    ];

    /// The fixed-timestep stages in execution order.
    pub const FIXED: [Self; 3] = [Self::FixedEarly, Self::Fixed, Self::FixedLate];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SystemUpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Registration data of one system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    /// Human-readable system name (e.g. `"outgoing_network"`).
    pub name: String,
    pub stage: SystemUpdateType,
    /// Scene systems are removed by `unload_systems(true)`.
    pub scene_system: bool,
}

impl SystemConfig {
    /// Create a config for an engine-lifetime system.
    #[must_use]
    pub fn new(name: impl Into<String>, stage: SystemUpdateType) -> Self {
        Self {
            name: name.into(),
            stage,
            scene_system: false,
        }
    }

    /// Mark the system as belonging to the current scene.
    #[must_use]
    pub fn scene(mut self) -> Self {
        self.scene_system = true;
        self
    }
}

/// Pipeline tunables.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// A system running longer than this logs a warning.
    pub slow_system_threshold_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            slow_system_threshold_ms: 10,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn slow_system_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_system_threshold_ms)
    }
}
