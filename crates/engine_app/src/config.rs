//! Coordinator configuration.

use std::path::Path;

use anyhow::Context;
use engine_net::NetworkConfig;
use engine_system::PipelineConfig;
use serde::Deserialize;
use tracing::info;

/// Names the JSON file to load the configuration from.
pub const CONFIG_ENV: &str = "ENGINE_CONFIG";

/// Everything the coordinator needs to start one engine instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed steps per second.
    pub tick_rate: f64,
    /// Frames to run before shutting down (0 = until interrupted).
    pub max_ticks: u64,
    pub network: NetworkConfig,
    pub pipeline: PipelineConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
            network: NetworkConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads the file named by `ENGINE_CONFIG`, or the defaults when unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config = Self::from_json(&raw).with_context(|| format!("parsing {}", path.display()))?;
        info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if `raw` is not a valid config document.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        anyhow::ensure!(
            config.tick_rate.is_finite() && config.tick_rate > 0.0,
            "tick_rate must be positive, got {}",
            config.tick_rate
        );
        Ok(config)
    }

    /// Length of one fixed step, in seconds.
    #[must_use]
    pub fn fixed_delta_seconds(&self) -> f64 {
        1.0 / self.tick_rate
    }
}
