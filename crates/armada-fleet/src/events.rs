//! Edge lifecycle events for external consumption.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why an edge left the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The stream errored or the edge closed it.
    StreamClosed,
    /// Silence exceeded the heartbeat timeout.
    HeartbeatTimeout,
    /// A reconnecting edge with the same ID replaced this connection.
    Replaced,
    /// The manager is shutting down.
    Shutdown,
}

impl DisconnectReason {
    /// String form used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StreamClosed => "stream closed",
            Self::HeartbeatTimeout => "heartbeat timeout",
            Self::Replaced => "replaced",
            Self::Shutdown => "shutdown",
        }
    }
}

/// What happened to an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeEventKind {
    /// Registration accepted.
    Connected,
    /// Removed from the registry.
    Disconnected {
        /// Why the edge was removed.
        reason: DisconnectReason,
    },
}

/// A lifecycle event emitted by the manager.
///
/// Fan-out uses a `tokio::sync::broadcast` channel: lagging subscribers lose
/// the oldest events rather than blocking the manager.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeEvent {
    /// The edge concerned.
    pub edge_id: String,
    /// What happened.
    #[serde(flatten)]
    pub kind: EdgeEventKind,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

impl EdgeEvent {
    /// Build an event stamped with the current time.
    #[must_use]
    pub fn now(edge_id: impl Into<String>, kind: EdgeEventKind) -> Self {
        Self {
            edge_id: edge_id.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}
