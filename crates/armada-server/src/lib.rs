//! HTTP + WebSocket surface for the edge fleet manager.
//!
//! `GET /connect` upgrades to the edge stream; the directory and health
//! endpoints are plain JSON over HTTP. Transport concerns live here, fleet
//! semantics live in `armada-fleet`.

pub mod auth;
pub mod health;
pub mod server;
pub mod session;
pub mod settings;
pub mod shutdown;

pub use auth::SharedSecretAuthenticator;
pub use server::{AppState, FleetServer};
pub use settings::{ServerSettings, SettingsError, load_settings, load_settings_from_path};
pub use shutdown::ShutdownCoordinator;
