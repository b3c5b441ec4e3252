//! The fleet manager: registration, dispatch correlation, and removal.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use armada_core::config::ManagerConfig;
use armada_core::errors::{FleetError, Result};
use armada_core::frames::{
    CancelFrame, ChannelAckFrame, ChannelInboundFrame, ChannelOutboundFrame, CoreFrame, EdgeFrame,
    RegisterFrame, RegisteredFrame, ToolExecuteFrame, ToolResultFrame,
};

use crate::auth::Authenticator;
use crate::connection::EdgeConnection;
use crate::directory::{self, EdgePage, EdgeStatus};
use crate::events::{DisconnectReason, EdgeEvent, EdgeEventKind};
use crate::pending::{PendingChannelMessage, PendingExecution, PendingTable};
use crate::registry::EdgeRegistry;
use crate::selector::{SelectionCriteria, Selector};
use crate::stats::{ManagerStats, StatsSnapshot};

/// How long an inbound channel message handler may run.
const CHANNEL_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Receives inbound channel messages pushed up from edges.
///
/// This is a push path, not request/response: nothing correlates these to a
/// pending call.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// Route one inbound message to the rest of the application.
    async fn on_channel_inbound(&self, message: ChannelInboundFrame) -> Result<()>;
}

/// Result of a tool execution on an edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutcome {
    /// Tool output.
    pub output: String,
    /// Whether the edge reported a failure.
    pub is_error: bool,
    /// Error detail when `is_error` is set.
    pub error: Option<String>,
    /// Execution duration in milliseconds, as measured on the edge.
    pub duration_ms: u64,
}

impl From<ToolResultFrame> for ToolOutcome {
    fn from(frame: ToolResultFrame) -> Self {
        Self {
            output: frame.output,
            is_error: frame.is_error,
            error: frame.error,
            duration_ms: frame.duration_ms,
        }
    }
}

/// Per-call options for dispatch operations.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Overrides the per-tool and manager default timeouts when set.
    pub timeout: Option<Duration>,
    /// Caller cancellation; shares the timeout resolution path.
    pub cancel: CancellationToken,
}

/// Coordinates edge connections, selection, and dispatch correlation.
pub struct FleetManager {
    config: ManagerConfig,
    registry: EdgeRegistry,
    selector: Selector,
    pending_execs: PendingTable<PendingExecution>,
    pending_msgs: PendingTable<PendingChannelMessage>,
    channel_handler: RwLock<Option<Arc<dyn ChannelHandler>>>,
    auth: Arc<dyn Authenticator>,
    events: broadcast::Sender<EdgeEvent>,
    stats: ManagerStats,
}

impl FleetManager {
    /// Create a manager with the given configuration and authenticator.
    #[must_use]
    pub fn new(config: ManagerConfig, auth: Arc<dyn Authenticator>) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer_size.max(1));
        Self {
            config,
            registry: EdgeRegistry::new(),
            selector: Selector::new(),
            pending_execs: PendingTable::default(),
            pending_msgs: PendingTable::default(),
            channel_handler: RwLock::new(None),
            auth,
            events,
            stats: ManagerStats::default(),
        }
    }

    /// Manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Subscribe to edge lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<EdgeEvent> {
        self.events.subscribe()
    }

    /// Install the handler for inbound channel messages.
    pub fn set_channel_handler(&self, handler: Arc<dyn ChannelHandler>) {
        *self.channel_handler.write() = Some(handler);
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Edges currently passing the liveness check.
    pub fn connected_count(&self) -> usize {
        let timeout = self.config.heartbeat_timeout();
        self.registry
            .snapshot()
            .iter()
            .filter(|c| c.is_selectable(timeout))
            .count()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration and removal
    // ─────────────────────────────────────────────────────────────────────

    /// Authenticate and register a new edge connection.
    ///
    /// On success the returned receiver is the connection's outbound frame
    /// queue; the transport layer must drain it into the stream. The first
    /// queued frame is the `Registered` acceptance. An existing entry with
    /// the same ID is replaced last-writer-wins and its correlations fail
    /// with `Disconnected`.
    pub async fn register(
        &self,
        registration: RegisterFrame,
    ) -> Result<(Arc<EdgeConnection>, mpsc::Receiver<CoreFrame>)> {
        let edge_id = match self.auth.authenticate(&registration).await {
            Ok(id) => id,
            Err(err) => {
                let _ = self.stats.failed_connections.fetch_add(1, Ordering::Relaxed);
                warn!(edge_id = %registration.edge_id, error = %err, "edge registration rejected");
                return Err(err);
            }
        };

        let (tx, rx) = mpsc::channel(self.config.send_buffer.max(1));
        let conn = Arc::new(EdgeConnection::new(edge_id.clone(), registration, tx));

        // Acceptance rides the same queue, so it is the first frame the
        // writer task puts on the wire.
        let _ = conn.send(CoreFrame::Registered(RegisteredFrame {
            success: true,
            edge_id: Some(edge_id.clone()),
            heartbeat_interval_secs: Some(self.config.heartbeat_interval_secs),
            error: None,
        }));

        if let Some(old) = self.registry.insert(Arc::clone(&conn)) {
            info!(edge_id = %edge_id, "replacing existing connection");
            self.fail_pending_for_edge(&edge_id);
            old.close();
            let _ = self.stats.connected_edges.fetch_sub(1, Ordering::Relaxed);
            self.emit(EdgeEvent::now(
                &edge_id,
                EdgeEventKind::Disconnected {
                    reason: DisconnectReason::Replaced,
                },
            ));
        }

        let _ = self.stats.connected_edges.fetch_add(1, Ordering::Relaxed);
        let _ = self.stats.total_connections.fetch_add(1, Ordering::Relaxed);
        self.emit(EdgeEvent::now(&edge_id, EdgeEventKind::Connected));
        info!(
            edge_id = %edge_id,
            name = %conn.name,
            tools = conn.tools.len(),
            version = %conn.version,
            "edge connected"
        );
        Ok((conn, rx))
    }

    /// Remove an edge from the registry.
    ///
    /// Fails every outstanding correlation scoped to that edge with
    /// `Disconnected` before the entry disappears. Removing an unknown ID
    /// is a no-op.
    pub fn remove_edge(&self, edge_id: &str, reason: DisconnectReason) {
        let Some(conn) = self.registry.remove(edge_id) else {
            return;
        };
        self.fail_pending_for_edge(edge_id);
        conn.close();
        let _ = self.stats.connected_edges.fetch_sub(1, Ordering::Relaxed);
        self.emit(EdgeEvent::now(
            edge_id,
            EdgeEventKind::Disconnected { reason },
        ));
        info!(edge_id = %edge_id, reason = reason.as_str(), "edge disconnected");
    }

    /// Remove every edge (shutdown path). Returns how many were dropped.
    pub fn remove_all(&self) -> usize {
        let snapshot = self.registry.snapshot();
        for conn in &snapshot {
            self.remove_edge(&conn.id, DisconnectReason::Shutdown);
        }
        snapshot.len()
    }

    /// Remove edges whose heartbeat age exceeds the configured timeout.
    ///
    /// Returns how many were removed. Called by the heartbeat monitor.
    pub fn sweep_stale_edges(&self) -> usize {
        let timeout = self.config.heartbeat_timeout();
        let stale: Vec<String> = self
            .registry
            .snapshot()
            .iter()
            .filter(|c| c.heartbeat_age() > timeout)
            .map(|c| c.id.clone())
            .collect();
        for edge_id in &stale {
            self.remove_edge(edge_id, DisconnectReason::HeartbeatTimeout);
        }
        stale.len()
    }

    fn fail_pending_for_edge(&self, edge_id: &str) {
        let execs = self
            .pending_execs
            .drain_matching(|p| p.edge_id == edge_id);
        for pending in execs {
            let _ = self.stats.failed_tool_calls.fetch_add(1, Ordering::Relaxed);
            let _ = pending
                .tx
                .send(Err(FleetError::Disconnected(edge_id.to_string())));
        }
        let msgs = self.pending_msgs.drain_matching(|p| p.edge_id == edge_id);
        for pending in msgs {
            let _ = pending
                .tx
                .send(Err(FleetError::Disconnected(edge_id.to_string())));
        }
    }

    fn emit(&self, event: EdgeEvent) {
        // No subscribers is fine; lagging subscribers drop oldest.
        let _ = self.events.send(event);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inbound frames (called from each edge's read loop)
    // ─────────────────────────────────────────────────────────────────────

    /// Demux one inbound frame from an edge.
    pub fn handle_frame(&self, conn: &Arc<EdgeConnection>, frame: EdgeFrame) {
        match frame {
            EdgeFrame::Register(_) => {
                warn!(edge_id = %conn.id, "duplicate register frame ignored");
            }
            EdgeFrame::Heartbeat(hb) => {
                debug!(
                    edge_id = %conn.id,
                    active = hb.metrics.active_tool_count,
                    "heartbeat"
                );
                conn.mark_heartbeat(hb.metrics);
            }
            EdgeFrame::ToolResult(result) => self.handle_tool_result(conn, result),
            EdgeFrame::ChannelInbound(msg) => self.handle_channel_inbound(conn, msg),
            EdgeFrame::ChannelAck(ack) => self.handle_channel_ack(conn, ack),
        }
    }

    fn handle_tool_result(&self, conn: &Arc<EdgeConnection>, result: ToolResultFrame) {
        let Some(pending) = self.pending_execs.remove(&result.call_id) else {
            // Unknown or already resolved (late after timeout/cancel).
            warn!(
                edge_id = %conn.id,
                call_id = %result.call_id,
                "dropping result for unknown execution"
            );
            return;
        };
        if pending.edge_id != conn.id {
            warn!(
                edge_id = %conn.id,
                call_id = %result.call_id,
                owner = %pending.edge_id,
                "dropping result from wrong edge"
            );
            self.pending_execs.restore(result.call_id, pending);
            return;
        }
        debug!(
            edge_id = %conn.id,
            call_id = %result.call_id,
            tool = %pending.tool_name,
            duration_ms = result.duration_ms,
            is_error = result.is_error,
            elapsed_ms = pending.started_at.elapsed().as_millis() as u64,
            "tool execution completed"
        );
        let _ = pending.tx.send(Ok(result.into()));
    }

    fn handle_channel_inbound(&self, conn: &Arc<EdgeConnection>, message: ChannelInboundFrame) {
        let handler = self.channel_handler.read().clone();
        let Some(handler) = handler else {
            warn!(
                edge_id = %conn.id,
                channel_type = %message.channel_type,
                channel_id = %message.channel_id,
                "inbound channel message but no handler configured"
            );
            return;
        };
        debug!(
            edge_id = %conn.id,
            channel_type = %message.channel_type,
            channel_id = %message.channel_id,
            sender_id = %message.sender_id,
            "inbound channel message"
        );
        // Never block the read loop on the handler.
        let edge_id = conn.id.clone();
        let _ = tokio::spawn(async move {
            let channel_type = message.channel_type.clone();
            match tokio::time::timeout(
                CHANNEL_HANDLER_TIMEOUT,
                handler.on_channel_inbound(message),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(edge_id = %edge_id, channel_type = %channel_type, error = %err, "channel inbound handler failed");
                }
                Err(_) => {
                    warn!(edge_id = %edge_id, channel_type = %channel_type, "channel inbound handler timed out");
                }
            }
        });
    }

    fn handle_channel_ack(&self, conn: &Arc<EdgeConnection>, ack: ChannelAckFrame) {
        let Some(pending) = self.pending_msgs.remove(&ack.message_id) else {
            warn!(
                edge_id = %conn.id,
                message_id = %ack.message_id,
                "dropping ack for unknown message"
            );
            return;
        };
        if pending.edge_id != conn.id {
            warn!(
                edge_id = %conn.id,
                message_id = %ack.message_id,
                owner = %pending.edge_id,
                "dropping ack from wrong edge"
            );
            self.pending_msgs.restore(ack.message_id, pending);
            return;
        }
        debug!(
            edge_id = %conn.id,
            message_id = %ack.message_id,
            status = %ack.status,
            elapsed_ms = pending.sent_at.elapsed().as_millis() as u64,
            "channel message acknowledged"
        );
        let _ = pending.tx.send(Ok(ack));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────────────

    /// Choose the best edge satisfying `criteria`.
    pub fn select_edge(&self, criteria: &SelectionCriteria) -> Result<Arc<EdgeConnection>> {
        self.selector.select(
            &self.registry.snapshot(),
            criteria,
            self.config.max_concurrent_tools,
            self.config.heartbeat_timeout(),
        )
    }

    /// Select an edge for `criteria` and execute its tool.
    ///
    /// `criteria.tool_name` is required.
    pub async fn execute_tool_any(
        &self,
        criteria: &SelectionCriteria,
        input: serde_json::Value,
        opts: ExecuteOptions,
    ) -> Result<ToolOutcome> {
        let tool_name = criteria
            .tool_name
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FleetError::InvalidRequest("tool_name is required".into()))?
            .to_string();
        let conn = self.select_edge(criteria)?;
        self.execute_tool(&conn.id, &tool_name, input, opts).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────────────

    /// Execute a tool on a specific edge and wait for its result.
    ///
    /// Blocks the caller on a per-call channel; timeout and caller
    /// cancellation share one resolution path (best-effort `Cancel` frame,
    /// slot discarded, late result dropped).
    pub async fn execute_tool(
        &self,
        edge_id: &str,
        tool_name: &str,
        input: serde_json::Value,
        opts: ExecuteOptions,
    ) -> Result<ToolOutcome> {
        let conn = self
            .registry
            .get(edge_id)
            .ok_or_else(|| FleetError::EdgeNotFound(edge_id.to_string()))?;
        let tool = conn
            .tools
            .get(tool_name)
            .ok_or_else(|| FleetError::ToolNotFound {
                edge_id: edge_id.to_string(),
                tool_name: tool_name.to_string(),
            })?;

        let timeout = opts.timeout.unwrap_or_else(|| {
            if tool.timeout_secs > 0 {
                Duration::from_secs(tool.timeout_secs)
            } else {
                self.config.default_tool_timeout()
            }
        });

        let call_id = Uuid::now_v7().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending_execs.insert(
            call_id.clone(),
            PendingExecution {
                edge_id: edge_id.to_string(),
                tool_name: tool_name.to_string(),
                started_at: Instant::now(),
                tx,
            },
        );

        // Visible to the selector for the whole wait.
        let active = conn.begin_tool();
        let _ = self.stats.total_tool_calls.fetch_add(1, Ordering::Relaxed);
        let _ = self.stats.active_tool_calls.fetch_add(1, Ordering::Relaxed);

        let dispatched = conn.send(CoreFrame::ToolExecute(ToolExecuteFrame {
            call_id: call_id.clone(),
            tool_name: tool_name.to_string(),
            input,
            timeout_secs: timeout.as_secs(),
        }));
        if !dispatched {
            let _ = self.pending_execs.remove(&call_id);
            self.finish_call(true);
            drop(active);
            return Err(FleetError::Disconnected(edge_id.to_string()));
        }

        debug!(
            edge_id = %edge_id,
            call_id = %call_id,
            tool = %tool_name,
            timeout_secs = timeout.as_secs(),
            "tool execution dispatched"
        );

        let outcome = tokio::select! {
            resolved = rx => match resolved {
                Ok(result) => result,
                // Sender dropped without resolving: the slot was discarded.
                Err(_) => Err(FleetError::Disconnected(edge_id.to_string())),
            },
            () = tokio::time::sleep(timeout) => {
                let _ = self.pending_execs.remove(&call_id);
                let _ = conn.send(CoreFrame::Cancel(CancelFrame {
                    call_id: call_id.clone(),
                    reason: "timeout".into(),
                }));
                Err(FleetError::Timeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
            () = opts.cancel.cancelled() => {
                let _ = self.pending_execs.remove(&call_id);
                let _ = conn.send(CoreFrame::Cancel(CancelFrame {
                    call_id: call_id.clone(),
                    reason: "context cancelled".into(),
                }));
                Err(FleetError::Cancelled("caller cancelled".into()))
            }
        };

        let failed = match &outcome {
            Ok(result) => result.is_error,
            Err(_) => true,
        };
        self.finish_call(failed);
        drop(active);
        outcome
    }

    fn finish_call(&self, failed: bool) {
        let _ = self.stats.active_tool_calls.fetch_sub(1, Ordering::Relaxed);
        if failed {
            let _ = self.stats.failed_tool_calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Cancel an in-flight execution, resolving its waiter with `Cancelled`.
    ///
    /// Fails `ExecutionNotFound` if the call is unknown or already resolved.
    pub fn cancel_tool(&self, edge_id: &str, call_id: &str, reason: &str) -> Result<()> {
        let Some(pending) = self.pending_execs.remove(call_id) else {
            return Err(FleetError::ExecutionNotFound(call_id.to_string()));
        };
        if pending.edge_id != edge_id {
            self.pending_execs.restore(call_id.to_string(), pending);
            return Err(FleetError::ExecutionNotFound(call_id.to_string()));
        }
        let _ = pending
            .tx
            .send(Err(FleetError::Cancelled(reason.to_string())));
        if let Some(conn) = self.registry.get(edge_id) {
            let _ = conn.send(CoreFrame::Cancel(CancelFrame {
                call_id: call_id.to_string(),
                reason: reason.to_string(),
            }));
        }
        info!(edge_id = %edge_id, call_id = %call_id, reason = %reason, "tool execution cancelled");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Channel messages
    // ─────────────────────────────────────────────────────────────────────

    /// Relay an outbound message through an edge channel and wait for its
    /// delivery acknowledgment.
    ///
    /// A missing `message_id` is filled with a fresh UUID. The wait is
    /// bounded by `opts.timeout` or the default tool timeout.
    pub async fn send_channel_message(
        &self,
        edge_id: &str,
        mut message: ChannelOutboundFrame,
        opts: ExecuteOptions,
    ) -> Result<ChannelAckFrame> {
        let conn = self
            .registry
            .get(edge_id)
            .ok_or_else(|| FleetError::EdgeNotFound(edge_id.to_string()))?;

        if message.message_id.is_empty() {
            message.message_id = Uuid::now_v7().to_string();
        }
        let message_id = message.message_id.clone();
        let timeout = opts
            .timeout
            .unwrap_or_else(|| self.config.default_tool_timeout());

        let (tx, rx) = oneshot::channel();
        self.pending_msgs.insert(
            message_id.clone(),
            PendingChannelMessage {
                edge_id: edge_id.to_string(),
                session_id: message.session_id.clone(),
                sent_at: Instant::now(),
                tx,
            },
        );

        if !conn.send(CoreFrame::ChannelOutbound(message)) {
            let _ = self.pending_msgs.remove(&message_id);
            return Err(FleetError::Disconnected(edge_id.to_string()));
        }

        debug!(
            edge_id = %edge_id,
            message_id = %message_id,
            "channel message dispatched"
        );

        tokio::select! {
            resolved = rx => match resolved {
                Ok(result) => result,
                Err(_) => Err(FleetError::Disconnected(edge_id.to_string())),
            },
            () = tokio::time::sleep(timeout) => {
                let _ = self.pending_msgs.remove(&message_id);
                Err(FleetError::Timeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
            () = opts.cancel.cancelled() => {
                let _ = self.pending_msgs.remove(&message_id);
                Err(FleetError::Cancelled("caller cancelled".into()))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Directory
    // ─────────────────────────────────────────────────────────────────────

    /// Status of one edge; unknown IDs project to a synthetic Disconnected.
    pub fn edge_status(&self, edge_id: &str) -> EdgeStatus {
        match self.registry.get(edge_id) {
            Some(conn) => EdgeStatus::from_connection(&conn),
            None => EdgeStatus::disconnected(edge_id),
        }
    }

    /// One ID-sorted page of the edge directory.
    pub fn list_edges(&self, page_size: i64, page_token: &str) -> EdgePage {
        let statuses: Vec<EdgeStatus> = self
            .registry
            .snapshot()
            .iter()
            .map(|c| EdgeStatus::from_connection(c))
            .collect();
        directory::paginate(statuses, page_size, page_token)
    }

    /// Look up a connection by ID.
    pub fn get_edge(&self, edge_id: &str) -> Option<Arc<EdgeConnection>> {
        self.registry.get(edge_id)
    }

    #[cfg(test)]
    pub(crate) fn pending_exec_count(&self) -> usize {
        self.pending_execs.len()
    }

    #[cfg(test)]
    pub(crate) fn pending_msg_count(&self) -> usize {
        self.pending_msgs.len()
    }
}

impl std::fmt::Debug for FleetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetManager")
            .field("edges", &self.registry.len())
            .finish_non_exhaustive()
    }
}
