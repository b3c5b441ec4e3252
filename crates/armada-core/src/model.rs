//! Model types describing edges: status, capabilities, tools, and load.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Connection lifecycle state of an edge.
///
/// `Connecting` covers the window between the stream opening and the
/// registration frame being accepted. The manager never stores it: an edge
/// only gets a registry entry once registration is accepted, so entries are
/// born `Connected` and the handshake window stays outside the registry. The
/// variant exists so status reports from edges mid-handshake stay
/// representable on the wire. `Disconnected` is terminal for a given
/// connection; a reconnecting edge with the same ID produces a fresh entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Stream open, registration not yet accepted.
    Connecting,
    /// Registration accepted, heartbeats flowing.
    Connected,
    /// Terminal: stream closed, heartbeat timed out, or replaced.
    Disconnected,
}

impl ConnectionStatus {
    /// String form used on the wire and in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Boolean capability flags an edge declares at registration.
///
/// Flags are monotonic for the lifetime of one connection: an edge cannot
/// drop a capability without reconnecting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeCapabilities {
    /// The edge can execute registered tools.
    #[serde(default)]
    pub tools: bool,
    /// The edge hosts channel adapters (inbound + outbound messaging).
    #[serde(default)]
    pub channels: bool,
    /// The edge supports streaming tool output.
    #[serde(default)]
    pub streaming: bool,
    /// The edge can produce artifacts (screenshots, files).
    #[serde(default)]
    pub artifacts: bool,
}

impl EdgeCapabilities {
    /// Whether this set satisfies `requested`: every flag requested `true`
    /// must be `true` here. Flags requested `false` are unconstrained.
    #[must_use]
    pub fn satisfies(&self, requested: &EdgeCapabilities) -> bool {
        (!requested.tools || self.tools)
            && (!requested.channels || self.channels)
            && (!requested.streaming || self.streaming)
            && (!requested.artifacts || self.artifacts)
    }
}

/// A named, schema-described capability an edge can execute on request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeTool {
    /// Tool name, looked up by exact match within one edge's catalog.
    pub name: String,
    /// Human/LLM-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool input, as a raw string.
    #[serde(default)]
    pub input_schema: String,
    /// Per-tool execution timeout override in seconds (`0` = manager default).
    #[serde(default)]
    pub timeout_secs: u64,
}

/// Load and health figures reported by an edge in its heartbeats.
///
/// These are the edge's own numbers. Selection load uses the manager-side
/// in-flight counter, not `active_tool_count` as reported here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeMetrics {
    /// Executions the edge believes are in flight.
    #[serde(default)]
    pub active_tool_count: u32,
    /// CPU utilization percentage.
    #[serde(default)]
    pub cpu_percent: f32,
    /// Resident memory in megabytes.
    #[serde(default)]
    pub memory_mb: u64,
    /// Seconds since the edge daemon started.
    #[serde(default)]
    pub uptime_secs: u64,
}

/// Key/value metadata map attached to an edge at registration.
pub type EdgeMetadata = HashMap<String, String>;
