//! JSON wire frames exchanged over an edge's bidirectional stream.
//!
//! The transport carries each frame as one text message. Both directions use
//! internally-tagged envelopes so a reader can demux on the `type` field
//! without knowing the payload shape.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{EdgeCapabilities, EdgeMetrics, EdgeTool};

// ─────────────────────────────────────────────────────────────────────────────
// Edge → manager
// ─────────────────────────────────────────────────────────────────────────────

/// Frames an edge sends to the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeFrame {
    /// Must be the first frame on a new stream.
    Register(RegisterFrame),
    /// Periodic liveness signal carrying load figures.
    Heartbeat(HeartbeatFrame),
    /// Result of a previously dispatched `ToolExecute`.
    ToolResult(ToolResultFrame),
    /// A message arriving at an edge-hosted channel (push path).
    ChannelInbound(ChannelInboundFrame),
    /// Delivery acknowledgment for a `ChannelOutbound`.
    ChannelAck(ChannelAckFrame),
}

/// Registration request: identity, credential, and declared capability set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterFrame {
    /// Requested edge identifier.
    pub edge_id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Edge daemon version string.
    #[serde(default)]
    pub version: String,
    /// Opaque credential, validated by the injected authenticator.
    #[serde(default)]
    pub credential: String,
    /// Capability flags, fixed for the lifetime of the connection.
    #[serde(default)]
    pub capabilities: EdgeCapabilities,
    /// Tools this edge exposes.
    #[serde(default)]
    pub tools: Vec<EdgeTool>,
    /// Channel types this edge can host.
    #[serde(default)]
    pub channel_types: Vec<String>,
    /// Environment metadata, usable as selection filters.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Heartbeat payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatFrame {
    /// Current load figures.
    #[serde(default)]
    pub metrics: EdgeMetrics,
}

/// Tool execution result, correlated by call ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResultFrame {
    /// The call this result answers.
    pub call_id: String,
    /// Tool output.
    #[serde(default)]
    pub output: String,
    /// Whether the execution failed on the edge.
    #[serde(default)]
    pub is_error: bool,
    /// Error detail when `is_error` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Execution duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

/// A message that arrived at an edge-hosted channel adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelInboundFrame {
    /// Channel type (e.g. `"imessage"`).
    pub channel_type: String,
    /// Channel/conversation identifier.
    pub channel_id: String,
    /// Sender identity within the channel.
    #[serde(default)]
    pub sender_id: String,
    /// Session routing key.
    #[serde(default)]
    pub session_key: String,
    /// Message content.
    #[serde(default)]
    pub content: String,
}

/// Delivery acknowledgment for an outbound channel message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelAckFrame {
    /// The outbound message this acknowledges.
    pub message_id: String,
    /// Delivery status (e.g. `"delivered"`, `"failed"`).
    #[serde(default)]
    pub status: String,
    /// Error detail on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager → edge
// ─────────────────────────────────────────────────────────────────────────────

/// Frames the manager sends to an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreFrame {
    /// Reply to `Register`; first manager frame on a successful stream.
    Registered(RegisteredFrame),
    /// Dispatch a tool execution.
    ToolExecute(ToolExecuteFrame),
    /// Best-effort cancellation of an in-flight execution.
    Cancel(CancelFrame),
    /// Relay an outbound message through an edge-hosted channel.
    ChannelOutbound(ChannelOutboundFrame),
}

/// Registration outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisteredFrame {
    /// Whether registration was accepted.
    pub success: bool,
    /// Approved edge ID (may differ from the requested one).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<String>,
    /// Heartbeat cadence the edge should use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_secs: Option<u64>,
    /// Rejection reason on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tool execution request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolExecuteFrame {
    /// Correlation identifier, unique per edge connection.
    pub call_id: String,
    /// Tool to execute; must exist in the edge's registered catalog.
    pub tool_name: String,
    /// Tool input payload.
    #[serde(default)]
    pub input: serde_json::Value,
    /// Deadline the edge should enforce locally.
    #[serde(default)]
    pub timeout_secs: u64,
}

/// Cancellation of an in-flight call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CancelFrame {
    /// The call to cancel.
    pub call_id: String,
    /// Why (`"timeout"`, `"context cancelled"`, caller-supplied).
    #[serde(default)]
    pub reason: String,
}

/// Outbound message relayed through an edge channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelOutboundFrame {
    /// Globally unique message identifier, correlated by `ChannelAck`.
    pub message_id: String,
    /// Originating session.
    #[serde(default)]
    pub session_id: String,
    /// Channel type the edge should deliver through.
    pub channel_type: String,
    /// Channel/conversation identifier.
    pub channel_id: String,
    /// Message content.
    #[serde(default)]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_frame_tagged() {
        let frame = EdgeFrame::Register(RegisterFrame {
            edge_id: "edge-1".into(),
            name: "macbook".into(),
            credential: "secret".into(),
            ..RegisterFrame::default()
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "register");
        assert_eq!(json["edge_id"], "edge-1");
    }

    #[test]
    fn heartbeat_roundtrip() {
        let frame = EdgeFrame::Heartbeat(HeartbeatFrame {
            metrics: EdgeMetrics {
                active_tool_count: 2,
                ..EdgeMetrics::default()
            },
        });
        let json = serde_json::to_string(&frame).unwrap();
        let back: EdgeFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn tool_result_without_error_omits_field() {
        let frame = EdgeFrame::ToolResult(ToolResultFrame {
            call_id: "c1".into(),
            output: "ok".into(),
            ..ToolResultFrame::default()
        });
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn tool_execute_tagged_snake_case() {
        let frame = CoreFrame::ToolExecute(ToolExecuteFrame {
            call_id: "c1".into(),
            tool_name: "browser.snapshot".into(),
            input: serde_json::json!({"url": "https://example.com"}),
            timeout_secs: 60,
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "tool_execute");
        assert_eq!(json["tool_name"], "browser.snapshot");
        assert_eq!(json["input"]["url"], "https://example.com");
    }

    #[test]
    fn registered_failure_carries_error() {
        let frame = CoreFrame::Registered(RegisteredFrame {
            success: false,
            error: Some("bad credential".into()),
            ..RegisteredFrame::default()
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "registered");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "bad credential");
        assert!(json.get("edge_id").is_none());
    }

    #[test]
    fn channel_outbound_roundtrip() {
        let frame = CoreFrame::ChannelOutbound(ChannelOutboundFrame {
            message_id: "m1".into(),
            session_id: "s1".into(),
            channel_type: "imessage".into(),
            channel_id: "chat-42".into(),
            content: "hello".into(),
        });
        let json = serde_json::to_string(&frame).unwrap();
        let back: CoreFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn unknown_type_fails_to_parse() {
        let result: Result<EdgeFrame, _> =
            serde_json::from_str(r#"{"type":"mystery","edge_id":"e1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn register_defaults_are_lenient() {
        let frame: EdgeFrame =
            serde_json::from_str(r#"{"type":"register","edge_id":"e1"}"#).unwrap();
        match frame {
            EdgeFrame::Register(reg) => {
                assert_eq!(reg.edge_id, "e1");
                assert!(reg.tools.is_empty());
                assert!(reg.channel_types.is_empty());
                assert!(!reg.capabilities.tools);
            }
            other => panic!("expected register, got {other:?}"),
        }
    }

    #[test]
    fn channel_ack_roundtrip() {
        let frame = EdgeFrame::ChannelAck(ChannelAckFrame {
            message_id: "m1".into(),
            status: "delivered".into(),
            error: None,
        });
        let json = serde_json::to_string(&frame).unwrap();
        let back: EdgeFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }
}
