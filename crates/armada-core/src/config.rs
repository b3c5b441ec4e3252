//! Fleet manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the fleet manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Cadence edges are told to heartbeat at, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Silence beyond this is treated as a dead edge, in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Default tool execution timeout, in seconds.
    pub default_tool_timeout_secs: u64,
    /// Load-normalizing denominator for least-busy selection.
    pub max_concurrent_tools: u32,
    /// Capacity of the edge event broadcast buffer.
    pub event_buffer_size: usize,
    /// Capacity of each connection's outbound frame queue.
    pub send_buffer: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            default_tool_timeout_secs: 60,
            max_concurrent_tools: 10,
            event_buffer_size: 1000,
            send_buffer: 256,
        }
    }
}

impl ManagerConfig {
    /// Heartbeat cadence as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Heartbeat timeout as a [`Duration`].
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Default tool timeout as a [`Duration`].
    #[must_use]
    pub fn default_tool_timeout(&self) -> Duration {
        Duration::from_secs(self.default_tool_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ManagerConfig::default();
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.heartbeat_timeout_secs, 90);
        assert_eq!(cfg.default_tool_timeout_secs, 60);
        assert_eq!(cfg.max_concurrent_tools, 10);
        assert_eq!(cfg.event_buffer_size, 1000);
        assert_eq!(cfg.send_buffer, 256);
    }

    #[test]
    fn duration_helpers() {
        let cfg = ManagerConfig::default();
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(90));
        assert_eq!(cfg.default_tool_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ManagerConfig =
            serde_json::from_str(r#"{"heartbeat_timeout_secs": 120}"#).unwrap();
        assert_eq!(cfg.heartbeat_timeout_secs, 120);
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.max_concurrent_tools, 10);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ManagerConfig {
            heartbeat_interval_secs: 10,
            heartbeat_timeout_secs: 25,
            default_tool_timeout_secs: 5,
            max_concurrent_tools: 4,
            event_buffer_size: 16,
            send_buffer: 8,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ManagerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
