//! Shutdown sequencing: stop the listeners, then drain the fleet.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use armada_fleet::FleetManager;

/// How long stragglers get before shutdown stops waiting for them.
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// Coordinates shutdown of the server tasks and the fleet they serve.
///
/// Cancellation fans out through the token (serve loop, heartbeat monitor,
/// session writers). The fleet drain itself runs here: every edge is
/// disconnected and its outstanding correlations fail immediately instead
/// of waiting out their timeouts.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    manager: Arc<FleetManager>,
}

impl ShutdownCoordinator {
    /// Coordinator for the given fleet.
    pub fn new(manager: Arc<FleetManager>) -> Self {
        Self {
            token: CancellationToken::new(),
            manager,
        }
    }

    /// A token that fires once shutdown begins.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Begin shutdown without waiting for anything. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run the full shutdown sequence.
    ///
    /// Fires the token, disconnects every edge (failing its pending calls
    /// and messages), then waits up to `deadline` for the given tasks to
    /// finish. Tasks still running after that are left to be dropped.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        deadline: Option<Duration>,
    ) {
        let deadline = deadline.unwrap_or(DRAIN_DEADLINE);

        self.shutdown();
        let dropped = self.manager.remove_all();
        info!(
            edges_dropped = dropped,
            task_count = handles.len(),
            deadline_secs = deadline.as_secs(),
            "draining for shutdown"
        );

        let drain = futures::future::join_all(handles);

        if tokio::time::timeout(deadline, drain).await.is_err() {
            warn!("shutdown deadline of {deadline:?} elapsed with tasks still running");
        }
    }
}
