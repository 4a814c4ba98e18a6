//! Network configuration.

use serde::Deserialize;

/// Tunables for state sync and client bookkeeping.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Every field is resent when `fixed_tick` is a multiple of this.
    pub heartbeat_interval: u32,
    /// Size in bytes of each writer's packet buffer.
    pub writer_capacity: usize,
    /// Clients silent for longer than this are dropped.
    pub client_timeout_ms: u64,
    /// Hosts broadcast a time sync after this many fixed ticks.
    pub time_sync_interval: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: 60,
            writer_capacity: 100_000,
            client_timeout_ms: 30_000,
            time_sync_interval: 60 * 60 * 2,
        }
    }
}

impl NetworkConfig {
    #[must_use]
    pub fn client_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.client_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: NetworkConfig = serde_json::from_str(r#"{ "heartbeat_interval": 30 }"#).unwrap();
        assert_eq!(config.heartbeat_interval, 30);
        assert_eq!(config.writer_capacity, 100_000);
        assert_eq!(config.client_timeout().as_secs(), 30);
    }
}
