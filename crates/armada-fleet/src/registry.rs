//! Concurrent registry of edge connections.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::connection::EdgeConnection;

/// Edge ID → connection map behind a registry-wide read/write lock.
///
/// The lock is only ever held for map operations, never across a blocking
/// wait. Snapshots are ID-sorted so pagination and round-robin see a
/// deterministic order.
#[derive(Default)]
pub struct EdgeRegistry {
    edges: RwLock<HashMap<String, Arc<EdgeConnection>>>,
}

impl EdgeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection, replacing any existing entry with the same ID
    /// (last-writer-wins). Returns the displaced connection, if any.
    pub fn insert(&self, conn: Arc<EdgeConnection>) -> Option<Arc<EdgeConnection>> {
        self.edges.write().insert(conn.id.clone(), conn)
    }

    /// Look up a connection by edge ID.
    pub fn get(&self, edge_id: &str) -> Option<Arc<EdgeConnection>> {
        self.edges.read().get(edge_id).cloned()
    }

    /// Remove a connection. Returns it if present; removing an unknown ID
    /// is a no-op.
    pub fn remove(&self, edge_id: &str) -> Option<Arc<EdgeConnection>> {
        self.edges.write().remove(edge_id)
    }

    /// ID-sorted snapshot of all connections.
    pub fn snapshot(&self) -> Vec<Arc<EdgeConnection>> {
        let mut conns: Vec<_> = self.edges.read().values().cloned().collect();
        conns.sort_by(|a, b| a.id.cmp(&b.id));
        conns
    }

    /// Number of registered edges.
    pub fn len(&self) -> usize {
        self.edges.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.edges.read().is_empty()
    }
}
