//! Background task evicting edges that stopped heartbeating.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::manager::FleetManager;

/// Spawn the heartbeat monitor.
///
/// Sweeps at half the heartbeat interval so a stale edge is noticed within
/// one eviction window of crossing the timeout. Stops when `cancel` fires.
pub fn spawn_heartbeat_monitor(
    manager: Arc<FleetManager>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let period = sweep_period(manager.config().heartbeat_interval());
    tokio::spawn(async move {
        info!(period_secs = period.as_secs(), "heartbeat monitor started");
        let mut ticker = tokio::time::interval(period);
        // The first tick fires immediately; skip it.
        let _ = ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = manager.sweep_stale_edges();
                    if removed > 0 {
                        debug!(removed, "evicted stale edges");
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
        info!("heartbeat monitor stopped");
    })
}

fn sweep_period(heartbeat_interval: Duration) -> Duration {
    (heartbeat_interval / 2).max(Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AcceptAll;
    use crate::events::EdgeEventKind;
    use armada_core::config::ManagerConfig;
    use armada_core::frames::RegisterFrame;
    use assert_matches::assert_matches;

    #[test]
    fn period_is_half_interval_clamped() {
        assert_eq!(
            sweep_period(Duration::from_secs(30)),
            Duration::from_secs(15)
        );
        assert_eq!(sweep_period(Duration::from_secs(1)), Duration::from_secs(1));
        assert_eq!(sweep_period(Duration::from_secs(0)), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_evicts_silent_edge() {
        // Zero timeout: any measurable silence counts as stale. Heartbeat age
        // runs on the monotonic clock, which tokio's paused clock does not
        // touch, so the wall sleep below is what makes the edge stale.
        let manager = Arc::new(FleetManager::new(
            ManagerConfig {
                heartbeat_interval_secs: 2,
                heartbeat_timeout_secs: 0,
                ..ManagerConfig::default()
            },
            Arc::new(AcceptAll),
        ));
        let (_conn, _rx) = manager
            .register(RegisterFrame {
                edge_id: "edge-1".into(),
                ..RegisterFrame::default()
            })
            .await
            .unwrap();
        let mut events = manager.subscribe();
        std::thread::sleep(Duration::from_millis(5));

        let cancel = CancellationToken::new();
        let handle = spawn_heartbeat_monitor(Arc::clone(&manager), cancel.clone());
        // Paused time auto-advances through the sweep ticks.
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(manager.get_edge("edge-1").is_none());
        let event = events.recv().await.unwrap();
        assert_eq!(event.edge_id, "edge-1");
        assert_matches!(
            event.kind,
            EdgeEventKind::Disconnected {
                reason: crate::events::DisconnectReason::HeartbeatTimeout
            }
        );

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_spares_heartbeating_edge() {
        let manager = Arc::new(FleetManager::new(
            ManagerConfig {
                heartbeat_interval_secs: 2,
                heartbeat_timeout_secs: 3,
                ..ManagerConfig::default()
            },
            Arc::new(AcceptAll),
        ));
        let (conn, _rx) = manager
            .register(RegisterFrame {
                edge_id: "edge-1".into(),
                ..RegisterFrame::default()
            })
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let handle = spawn_heartbeat_monitor(Arc::clone(&manager), cancel.clone());

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            conn.mark_heartbeat(armada_core::model::EdgeMetrics::default());
        }
        assert!(manager.get_edge("edge-1").is_some());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_stops_on_cancel() {
        let manager = Arc::new(FleetManager::new(
            ManagerConfig::default(),
            Arc::new(AcceptAll),
        ));
        let cancel = CancellationToken::new();
        let handle = spawn_heartbeat_monitor(manager, cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("must stop promptly")
            .unwrap();
    }
}
