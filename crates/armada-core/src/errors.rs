//! Error taxonomy for fleet operations.
//!
//! Everything surfaces as an ordinary [`FleetError`]; nothing panics. The
//! [`ErrorKind`] classifier groups variants into the coarse categories used
//! for logging and metrics decisions.

use thiserror::Error;

/// Errors returned by fleet manager operations.
#[derive(Debug, Error)]
pub enum FleetError {
    /// No connected edge with this ID.
    #[error("edge not connected: {0}")]
    EdgeNotFound(String),

    /// The edge is connected but does not expose the requested tool.
    #[error("tool not found on edge {edge_id}: {tool_name}")]
    ToolNotFound {
        /// Edge that was asked.
        edge_id: String,
        /// Tool that was requested.
        tool_name: String,
    },

    /// No pending execution with this call ID (unknown or already resolved).
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// No pending channel message with this message ID.
    #[error("pending message not found: {0}")]
    MessageNotFound(String),

    /// Selection matched zero edges.
    #[error("no edges match the selection criteria")]
    NoCandidates,

    /// The request was malformed before any edge was involved.
    #[error("{0}")]
    InvalidRequest(String),

    /// Registration rejected; the stream is closed and no entry created.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Deadline elapsed awaiting correlation; best-effort cancel was sent.
    #[error("tool execution timed out after {timeout_secs}s")]
    Timeout {
        /// The effective timeout that elapsed.
        timeout_secs: u64,
    },

    /// Caller cancelled while awaiting correlation.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The edge was removed mid-flight; all its correlations fail this way.
    #[error("edge disconnected: {0}")]
    Disconnected(String),

    /// Malformed frame. Logged and dropped at the read loop; surfaced only
    /// when the caller itself produced the bad payload.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Coarse classification of a [`FleetError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown edge, pending execution, or pending message.
    NotFound,
    /// Selection matched zero edges.
    NoCandidates,
    /// Malformed request.
    InvalidRequest,
    /// Registration rejected.
    AuthenticationFailed,
    /// Deadline elapsed.
    Timeout,
    /// Caller cancelled.
    Cancelled,
    /// Edge removed mid-flight.
    Disconnected,
    /// Malformed frame or payload.
    Encoding,
}

impl FleetError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EdgeNotFound(_)
            | Self::ToolNotFound { .. }
            | Self::ExecutionNotFound(_)
            | Self::MessageNotFound(_) => ErrorKind::NotFound,
            Self::NoCandidates => ErrorKind::NoCandidates,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Disconnected(_) => ErrorKind::Disconnected,
            Self::Encoding(_) => ErrorKind::Encoding,
        }
    }

    /// Whether this is any of the not-found variants.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Convenience alias for fleet operations.
pub type Result<T> = std::result::Result<T, FleetError>;
