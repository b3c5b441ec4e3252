//! Shared-secret edge authentication.

use async_trait::async_trait;

use armada_core::errors::{FleetError, Result};
use armada_core::frames::RegisterFrame;
use armada_fleet::Authenticator;

/// Accepts a registration when its credential equals the configured secret.
///
/// The edge's requested ID is approved unchanged. Comparison is
/// constant-time to avoid leaking prefix length through timing.
pub struct SharedSecretAuthenticator {
    secret: String,
}

impl SharedSecretAuthenticator {
    /// Build an authenticator around the given secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl Authenticator for SharedSecretAuthenticator {
    async fn authenticate(&self, registration: &RegisterFrame) -> Result<String> {
        if registration.edge_id.is_empty() {
            return Err(FleetError::AuthenticationFailed("edge_id is required".into()));
        }
        if registration.credential.is_empty() {
            return Err(FleetError::AuthenticationFailed("credential is required".into()));
        }
        if !constant_time_eq(registration.credential.as_bytes(), self.secret.as_bytes()) {
            return Err(FleetError::AuthenticationFailed("invalid credential".into()));
        }
        Ok(registration.edge_id.clone())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn registration(edge_id: &str, credential: &str) -> RegisterFrame {
        RegisterFrame {
            edge_id: edge_id.into(),
            credential: credential.into(),
            ..RegisterFrame::default()
        }
    }

    #[tokio::test]
    async fn accepts_matching_secret() {
        let auth = SharedSecretAuthenticator::new("hunter2");
        let id = auth
            .authenticate(&registration("edge-1", "hunter2"))
            .await
            .unwrap();
        assert_eq!(id, "edge-1");
    }

    #[tokio::test]
    async fn rejects_wrong_secret() {
        let auth = SharedSecretAuthenticator::new("hunter2");
        let err = auth
            .authenticate(&registration("edge-1", "hunter3"))
            .await
            .unwrap_err();
        assert_matches!(err, FleetError::AuthenticationFailed(_));
    }

    #[tokio::test]
    async fn rejects_empty_credential() {
        let auth = SharedSecretAuthenticator::new("hunter2");
        let err = auth
            .authenticate(&registration("edge-1", ""))
            .await
            .unwrap_err();
        assert_matches!(err, FleetError::AuthenticationFailed(_));
    }

    #[tokio::test]
    async fn rejects_empty_edge_id() {
        let auth = SharedSecretAuthenticator::new("hunter2");
        let err = auth
            .authenticate(&registration("", "hunter2"))
            .await
            .unwrap_err();
        assert_matches!(err, FleetError::AuthenticationFailed(_));
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }
}
