//! Per-edge mutable connection state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use armada_core::frames::{CoreFrame, RegisterFrame};
use armada_core::model::{ConnectionStatus, EdgeCapabilities, EdgeMetrics, EdgeTool};

/// A connected edge daemon.
///
/// Created on successful authentication and owned by the registry. The tool
/// catalog, channel types, capabilities, and metadata are fixed for the
/// lifetime of the connection; liveness and load fields are mutated by the
/// edge's read loop and the dispatcher.
///
/// Outbound frames go through a bounded queue drained by a dedicated writer
/// task, so the underlying stream never has two concurrent writers.
pub struct EdgeConnection {
    /// Unique edge identifier (authenticator-approved).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Edge daemon version string.
    pub version: String,
    /// Tools registered by this edge, keyed by exact name.
    pub tools: HashMap<String, EdgeTool>,
    /// Channel types this edge can host.
    pub channel_types: HashSet<String>,
    /// Capability flags, monotonic per connection.
    pub capabilities: EdgeCapabilities,
    /// Environment metadata, usable as selection filters.
    pub metadata: HashMap<String, String>,
    /// When the edge registered.
    pub connected_at: DateTime<Utc>,

    status: Mutex<ConnectionStatus>,
    last_heartbeat: Mutex<Instant>,
    reported_metrics: Mutex<EdgeMetrics>,
    active_tools: AtomicU32,
    tx: mpsc::Sender<CoreFrame>,
    cancel: CancellationToken,
    /// Count of outbound frames dropped because the queue was full or closed.
    dropped_frames: AtomicU64,
}

impl EdgeConnection {
    /// Build a connection from an accepted registration.
    #[must_use]
    pub fn new(edge_id: String, registration: RegisterFrame, tx: mpsc::Sender<CoreFrame>) -> Self {
        let tools = registration
            .tools
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();
        Self {
            id: edge_id,
            name: registration.name,
            version: registration.version,
            tools,
            channel_types: registration.channel_types.into_iter().collect(),
            capabilities: registration.capabilities,
            metadata: registration.metadata,
            connected_at: Utc::now(),
            status: Mutex::new(ConnectionStatus::Connected),
            last_heartbeat: Mutex::new(Instant::now()),
            reported_metrics: Mutex::new(EdgeMetrics::default()),
            active_tools: AtomicU32::new(0),
            tx,
            cancel: CancellationToken::new(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Enqueue an outbound frame for the writer task.
    ///
    /// Returns `false` if the queue is full or closed, incrementing the
    /// dropped frame counter.
    pub fn send(&self, frame: CoreFrame) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total outbound frames dropped on this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock()
    }

    /// Transition the lifecycle state.
    pub fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock() = status;
    }

    /// Record an inbound heartbeat.
    pub fn mark_heartbeat(&self, metrics: EdgeMetrics) {
        *self.last_heartbeat.lock() = Instant::now();
        *self.reported_metrics.lock() = metrics;
    }

    /// Time since the last heartbeat (or registration).
    pub fn heartbeat_age(&self) -> Duration {
        self.last_heartbeat.lock().elapsed()
    }

    /// Metrics the edge last reported.
    pub fn reported_metrics(&self) -> EdgeMetrics {
        *self.reported_metrics.lock()
    }

    /// Whether this edge may be chosen by the selector: connected and
    /// heartbeating within `heartbeat_timeout`.
    pub fn is_selectable(&self, heartbeat_timeout: Duration) -> bool {
        self.status() == ConnectionStatus::Connected && self.heartbeat_age() < heartbeat_timeout
    }

    /// Executions currently dispatched to this edge by the manager.
    pub fn active_tool_count(&self) -> u32 {
        self.active_tools.load(Ordering::Relaxed)
    }

    /// Normalized load in `[0, ..)` for least-busy ranking.
    pub fn load(&self, max_concurrent_tools: u32) -> f64 {
        f64::from(self.active_tool_count()) / f64::from(max_concurrent_tools.max(1))
    }

    /// Increment the in-flight counter; the guard decrements on drop.
    #[must_use]
    pub fn begin_tool(self: &Arc<Self>) -> ActiveToolGuard {
        let _ = self.active_tools.fetch_add(1, Ordering::Relaxed);
        ActiveToolGuard {
            conn: Arc::clone(self),
        }
    }

    /// Token cancelled when the connection is removed or replaced.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Mark the connection disconnected and stop its reader/writer tasks.
    pub fn close(&self) {
        self.set_status(ConnectionStatus::Disconnected);
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for EdgeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeConnection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .field("tools", &self.tools.len())
            .field("active_tools", &self.active_tool_count())
            .finish_non_exhaustive()
    }
}

/// RAII guard keeping [`EdgeConnection::active_tool_count`] balanced across
/// every dispatch exit path.
pub struct ActiveToolGuard {
    conn: Arc<EdgeConnection>,
}

impl Drop for ActiveToolGuard {
    fn drop(&mut self) {
        // Saturating: a stray double-drop must never wrap the counter.
        let _ = self
            .conn
            .active_tools
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }
}
