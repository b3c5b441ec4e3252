//! Directory projections: edge status and paginated listings.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use armada_core::model::{ConnectionStatus, EdgeCapabilities, EdgeMetrics};

use crate::connection::EdgeConnection;

/// Default page size when the caller passes zero or a negative value.
const DEFAULT_PAGE_SIZE: i64 = 100;

/// Point-in-time status of one edge.
///
/// Absence is representable: an unknown ID projects to a synthetic
/// `Disconnected` status rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeStatus {
    /// Edge identifier.
    pub edge_id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Connection lifecycle state.
    pub connection_status: ConnectionStatus,
    /// When the edge registered, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    /// Seconds since the last heartbeat, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_age_secs: Option<u64>,
    /// Names of the tools the edge exposes, sorted.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Channel types the edge hosts, sorted.
    #[serde(default)]
    pub channel_types: Vec<String>,
    /// Declared capability flags.
    #[serde(default)]
    pub capabilities: EdgeCapabilities,
    /// Environment metadata.
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
    /// Metrics the edge last reported, if any heartbeat arrived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<EdgeMetrics>,
    /// Executions the manager currently has in flight on this edge.
    #[serde(default)]
    pub active_tool_count: u32,
    /// Edge daemon version.
    #[serde(default)]
    pub version: String,
}

impl EdgeStatus {
    /// Project a live connection.
    #[must_use]
    pub fn from_connection(conn: &EdgeConnection) -> Self {
        let mut tools: Vec<String> = conn.tools.keys().cloned().collect();
        tools.sort();
        let mut channel_types: Vec<String> = conn.channel_types.iter().cloned().collect();
        channel_types.sort();
        Self {
            edge_id: conn.id.clone(),
            name: conn.name.clone(),
            connection_status: conn.status(),
            connected_at: Some(conn.connected_at),
            heartbeat_age_secs: Some(conn.heartbeat_age().as_secs()),
            tools,
            channel_types,
            capabilities: conn.capabilities,
            metadata: conn.metadata.clone(),
            metrics: Some(conn.reported_metrics()),
            active_tool_count: conn.active_tool_count(),
            version: conn.version.clone(),
        }
    }

    /// Synthetic status for an edge the registry does not know.
    #[must_use]
    pub fn disconnected(edge_id: impl Into<String>) -> Self {
        Self {
            edge_id: edge_id.into(),
            name: String::new(),
            connection_status: ConnectionStatus::Disconnected,
            connected_at: None,
            heartbeat_age_secs: None,
            tools: Vec::new(),
            channel_types: Vec::new(),
            capabilities: EdgeCapabilities::default(),
            metadata: std::collections::HashMap::new(),
            metrics: None,
            active_tool_count: 0,
            version: String::new(),
        }
    }
}

/// One page of the edge directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgePage {
    /// Statuses on this page, ID-sorted.
    pub edges: Vec<EdgeStatus>,
    /// Total edges across all pages, constant while the fleet is stable.
    pub total_count: usize,
    /// Token for the next page; empty exactly when this page reaches the end.
    pub next_page_token: String,
}

/// Encode a page offset as an opaque token.
#[must_use]
pub fn encode_page_token(offset: usize) -> String {
    BASE64.encode(offset.to_string())
}

/// Decode a page token leniently: malformed input means offset zero.
#[must_use]
pub fn decode_page_token(token: &str) -> usize {
    if token.is_empty() {
        return 0;
    }
    BASE64
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0)
}

/// Slice an ID-sorted status list into one page.
///
/// `page_size <= 0` defaults to 100. An out-of-range offset yields an empty
/// page with the correct `total_count`.
#[must_use]
pub fn paginate(statuses: Vec<EdgeStatus>, page_size: i64, page_token: &str) -> EdgePage {
    let page_size = if page_size <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size
    };
    let page_size = usize::try_from(page_size).unwrap_or(DEFAULT_PAGE_SIZE as usize);
    let total_count = statuses.len();
    let offset = decode_page_token(page_token);

    if offset >= total_count {
        return EdgePage {
            edges: Vec::new(),
            total_count,
            next_page_token: String::new(),
        };
    }

    let end = (offset + page_size).min(total_count);
    let edges = statuses[offset..end].to_vec();
    let next_page_token = if end < total_count {
        encode_page_token(end)
    } else {
        String::new()
    };
    EdgePage {
        edges,
        total_count,
        next_page_token,
    }
}
