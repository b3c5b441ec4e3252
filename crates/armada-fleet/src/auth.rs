//! Edge authentication seam.
//!
//! The manager never inspects credentials itself; the decision is delegated
//! to an injected [`Authenticator`]. The server layer supplies a real
//! implementation (shared-secret today); [`AcceptAll`] exists for local
//! development and tests.

use async_trait::async_trait;

use armada_core::errors::{FleetError, Result};
use armada_core::frames::RegisterFrame;

/// Validates edge registration requests.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Validate a registration and return the approved edge ID.
    ///
    /// The approved ID may differ from the requested one (an authenticator
    /// is free to canonicalize). On failure the stream is torn down and no
    /// registry entry is created.
    async fn authenticate(&self, registration: &RegisterFrame) -> Result<String>;
}

/// Accepts every registration with a non-empty edge ID.
///
/// Development/test use only.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

#[async_trait]
impl Authenticator for AcceptAll {
    async fn authenticate(&self, registration: &RegisterFrame) -> Result<String> {
        if registration.edge_id.is_empty() {
            return Err(FleetError::AuthenticationFailed("edge_id is required".into()));
        }
        Ok(registration.edge_id.clone())
    }
}
