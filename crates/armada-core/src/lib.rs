//! Foundation types for the Armada edge fleet manager.
//!
//! This crate holds everything shared between the manager and its transport
//! surface: the JSON wire frames exchanged with edge daemons, the model types
//! describing an edge's capabilities and load, the error taxonomy, and the
//! manager configuration. It performs no I/O.

pub mod config;
pub mod errors;
pub mod frames;
pub mod model;

pub use config::ManagerConfig;
pub use errors::{ErrorKind, FleetError};
pub use frames::{CoreFrame, EdgeFrame};
pub use model::{ConnectionStatus, EdgeCapabilities, EdgeMetrics, EdgeTool};
