//! In-flight correlation state for dispatched requests.
//!
//! Pending slots are keyed externally by call/message ID in maps owned by
//! the manager, never embedded in the connection itself; removing a slot is
//! how a late result gets discarded.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use armada_core::errors::FleetError;
use armada_core::frames::ChannelAckFrame;

use crate::manager::ToolOutcome;

/// A dispatched tool execution awaiting its result.
///
/// Resolved at most once: whichever of success, timeout, cancel, or
/// disconnect happens first wins. Resolution happens by sending on `tx`;
/// discarding the slot drops the sender, failing the waiter.
pub(crate) struct PendingExecution {
    /// Edge the call was dispatched to.
    pub edge_id: String,
    /// Tool being executed (for logs).
    pub tool_name: String,
    /// When the call was dispatched.
    pub started_at: Instant,
    /// Waiter resolution channel.
    pub tx: oneshot::Sender<Result<ToolOutcome, FleetError>>,
}

/// An outbound channel message awaiting its delivery acknowledgment.
pub(crate) struct PendingChannelMessage {
    /// Edge the message was relayed through.
    pub edge_id: String,
    /// Originating session.
    pub session_id: String,
    /// When the message was sent.
    pub sent_at: Instant,
    /// Waiter resolution channel.
    pub tx: oneshot::Sender<Result<ChannelAckFrame, FleetError>>,
}

/// Map of in-flight correlations keyed by call/message ID.
pub(crate) struct PendingTable<T> {
    entries: Mutex<HashMap<String, T>>,
}

impl<T> Default for PendingTable<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> PendingTable<T> {
    /// Park a new slot under `id`.
    pub fn insert(&self, id: String, entry: T) {
        let _ = self.entries.lock().insert(id, entry);
    }

    /// Take the slot for `id`, if still pending.
    pub fn remove(&self, id: &str) -> Option<T> {
        self.entries.lock().remove(id)
    }

    /// Put a slot back (used when a frame arrived for the wrong edge).
    pub fn restore(&self, id: String, entry: T) {
        let _ = self.entries.lock().insert(id, entry);
    }

    /// Number of outstanding slots.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Drain every slot matching `predicate`.
    pub fn drain_matching(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        let mut entries = self.entries.lock();
        let ids: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| predicate(entry))
            .map(|(id, _)| id.clone())
            .collect();
        ids.into_iter()
            .filter_map(|id| entries.remove(&id))
            .collect()
    }
}
