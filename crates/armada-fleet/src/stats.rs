//! Manager-level counters.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters maintained by the manager.
///
/// `connected_edges` and `active_tool_calls` are signed so that transient
/// interleavings can never wrap a decrement below zero.
#[derive(Debug, Default)]
pub struct ManagerStats {
    /// Edges currently registered.
    pub connected_edges: AtomicI64,
    /// Registrations accepted over the process lifetime.
    pub total_connections: AtomicU64,
    /// Registrations rejected by the authenticator.
    pub failed_connections: AtomicU64,
    /// Tool executions dispatched.
    pub total_tool_calls: AtomicU64,
    /// Tool executions that failed (error result, timeout, cancel, disconnect).
    pub failed_tool_calls: AtomicU64,
    /// Tool executions currently awaiting a result.
    pub active_tool_calls: AtomicI64,
}

/// A point-in-time copy of [`ManagerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Edges currently registered.
    pub connected_edges: i64,
    /// Registrations accepted over the process lifetime.
    pub total_connections: u64,
    /// Registrations rejected by the authenticator.
    pub failed_connections: u64,
    /// Tool executions dispatched.
    pub total_tool_calls: u64,
    /// Tool executions that failed.
    pub failed_tool_calls: u64,
    /// Tool executions currently awaiting a result.
    pub active_tool_calls: i64,
}

impl ManagerStats {
    /// Take a consistent-enough snapshot for reporting.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connected_edges: self.connected_edges.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            failed_connections: self.failed_connections.load(Ordering::Relaxed),
            total_tool_calls: self.total_tool_calls.load(Ordering::Relaxed),
            failed_tool_calls: self.failed_tool_calls.load(Ordering::Relaxed),
            active_tool_calls: self.active_tool_calls.load(Ordering::Relaxed),
        }
    }
}
