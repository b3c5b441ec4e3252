//! Edge fleet manager.
//!
//! Maintains the registry of long-lived edge connections, tracks their live
//! capability set, health, and load, selects the best edge for a dispatch
//! request under a pluggable strategy, and correlates outbound
//! tool-execution / channel-message traffic with inbound responses under
//! timeout and cancellation.
//!
//! The transport is deliberately out of scope: a server layer hands each
//! accepted connection's outbound frame queue to a writer task and feeds
//! inbound frames into [`FleetManager::handle_frame`].

pub mod auth;
pub mod connection;
pub mod directory;
pub mod events;
pub mod heartbeat;
pub mod manager;
mod pending;
pub mod registry;
pub mod selector;
pub mod stats;

pub use auth::Authenticator;
pub use connection::EdgeConnection;
pub use directory::{EdgePage, EdgeStatus};
pub use events::{DisconnectReason, EdgeEvent, EdgeEventKind};
pub use manager::{ChannelHandler, ExecuteOptions, FleetManager, ToolOutcome};
pub use selector::{SelectionCriteria, SelectionStrategy};
pub use stats::StatsSnapshot;
