//! Edge selection: pure filtering plus pluggable ranking.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use armada_core::errors::{FleetError, Result};
use armada_core::model::EdgeCapabilities;

use crate::connection::EdgeConnection;

/// Algorithm choosing one edge among matching candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Lowest normalized load wins; ties broken by smallest edge ID.
    #[default]
    LeastBusy,
    /// Shared monotonic counter modulo candidate count.
    RoundRobin,
    /// Uniform pick from one shared pseudo-random source.
    Random,
}

impl SelectionStrategy {
    /// Parse leniently: unrecognized or empty strings fall back to
    /// [`SelectionStrategy::LeastBusy`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "round_robin" => Self::RoundRobin,
            "random" => Self::Random,
            _ => Self::LeastBusy,
        }
    }
}

/// Filter predicate plus ranking strategy for a dispatch request.
///
/// All set filters must hold for an edge to be a candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionCriteria {
    /// Required tool, matched exactly against the edge's catalog.
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Required hosted channel type.
    #[serde(default)]
    pub channel_type: Option<String>,
    /// Required capability superset: every `true` flag must be present.
    #[serde(default)]
    pub capabilities: Option<EdgeCapabilities>,
    /// Required metadata subset: every non-empty key/value must match
    /// exactly; a missing key is no match.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Ranking strategy.
    #[serde(default)]
    pub strategy: SelectionStrategy,
}

impl SelectionCriteria {
    /// Criteria requiring only a tool name, with default strategy.
    #[must_use]
    pub fn for_tool(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::default()
        }
    }

    /// Whether `conn` passes every set filter. Liveness (connected status
    /// and heartbeat freshness) is part of the predicate.
    #[must_use]
    pub fn matches(&self, conn: &EdgeConnection, heartbeat_timeout: Duration) -> bool {
        if !conn.is_selectable(heartbeat_timeout) {
            return false;
        }
        if let Some(tool) = &self.tool_name {
            if !conn.tools.contains_key(tool) {
                return false;
            }
        }
        if let Some(channel) = &self.channel_type {
            if !conn.channel_types.contains(channel) {
                return false;
            }
        }
        if let Some(required) = &self.capabilities {
            if !conn.capabilities.satisfies(required) {
                return false;
            }
        }
        for (key, value) in &self.metadata {
            if value.is_empty() {
                continue;
            }
            if conn.metadata.get(key) != Some(value) {
                return false;
            }
        }
        true
    }
}

/// Side-effect-free ranking over a registry snapshot.
///
/// The round-robin counter is monotonic process-wide, not per criteria set:
/// fairness holds only across a stable, repeated candidate set. The random
/// source is shared and guarded by its own lock.
pub struct Selector {
    rr_counter: AtomicU64,
    rng: Mutex<StdRng>,
}

impl Selector {
    /// Create a selector with a fresh OS-seeded random source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rr_counter: AtomicU64::new(0),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Filter `snapshot` by `criteria` and pick one edge per the strategy.
    ///
    /// `snapshot` must be ID-sorted (the registry guarantees this), which
    /// makes least-busy tie-breaks and round-robin deterministic.
    pub fn select(
        &self,
        snapshot: &[Arc<EdgeConnection>],
        criteria: &SelectionCriteria,
        max_concurrent_tools: u32,
        heartbeat_timeout: Duration,
    ) -> Result<Arc<EdgeConnection>> {
        let candidates: Vec<&Arc<EdgeConnection>> = snapshot
            .iter()
            .filter(|c| criteria.matches(c, heartbeat_timeout))
            .collect();
        if candidates.is_empty() {
            return Err(FleetError::NoCandidates);
        }

        let chosen = match criteria.strategy {
            SelectionStrategy::LeastBusy => candidates
                .iter()
                .min_by(|a, b| {
                    a.load(max_concurrent_tools)
                        .partial_cmp(&b.load(max_concurrent_tools))
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.id.cmp(&b.id))
                })
                .copied(),
            SelectionStrategy::RoundRobin => {
                let ticket = self.rr_counter.fetch_add(1, Ordering::Relaxed);
                let idx = usize::try_from(ticket % candidates.len() as u64).unwrap_or(0);
                candidates.get(idx).copied()
            }
            SelectionStrategy::Random => {
                let idx = self.rng.lock().random_range(0..candidates.len());
                candidates.get(idx).copied()
            }
        };

        chosen.cloned().ok_or(FleetError::NoCandidates)
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_core::frames::RegisterFrame;
    use armada_core::model::EdgeTool;
    use assert_matches::assert_matches;
    use tokio::sync::mpsc;

    const HB_TIMEOUT: Duration = Duration::from_secs(90);

    fn make_edge(id: &str, tools: &[&str], active: u32) -> Arc<EdgeConnection> {
        let (tx, rx) = mpsc::channel(8);
        // Leak the receiver so sends keep succeeding in tests.
        let _ = Box::leak(Box::new(rx));
        let reg = RegisterFrame {
            edge_id: id.into(),
            tools: tools
                .iter()
                .map(|name| EdgeTool {
                    name: (*name).into(),
                    ..EdgeTool::default()
                })
                .collect(),
            ..RegisterFrame::default()
        };
        let conn = Arc::new(EdgeConnection::new(id.into(), reg, tx));
        for _ in 0..active {
            std::mem::forget(conn.begin_tool());
        }
        conn
    }

    fn sorted(mut edges: Vec<Arc<EdgeConnection>>) -> Vec<Arc<EdgeConnection>> {
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        edges
    }

    #[test]
    fn empty_match_set_is_no_candidates() {
        let selector = Selector::new();
        let snapshot = vec![make_edge("edge-a", &["shell.exec"], 0)];
        let criteria = SelectionCriteria::for_tool("camera.capture");
        let err = selector
            .select(&snapshot, &criteria, 10, HB_TIMEOUT)
            .unwrap_err();
        assert_matches!(err, FleetError::NoCandidates);
    }

    #[test]
    fn filter_requires_exact_tool_match() {
        let snapshot = vec![
            make_edge("edge-a", &["browser.snapshot"], 0),
            make_edge("edge-b", &["shell.exec"], 0),
        ];
        let selector = Selector::new();
        let chosen = selector
            .select(
                &snapshot,
                &SelectionCriteria::for_tool("shell.exec"),
                10,
                HB_TIMEOUT,
            )
            .unwrap();
        assert_eq!(chosen.id, "edge-b");
    }

    #[test]
    fn filter_excludes_stale_and_disconnected() {
        let fresh = make_edge("edge-a", &["shell.exec"], 0);
        let dead = make_edge("edge-b", &["shell.exec"], 0);
        dead.close();
        let snapshot = sorted(vec![fresh, dead]);

        let selector = Selector::new();
        let criteria = SelectionCriteria::for_tool("shell.exec");
        let chosen = selector.select(&snapshot, &criteria, 10, HB_TIMEOUT).unwrap();
        assert_eq!(chosen.id, "edge-a");

        // With a zero heartbeat timeout nothing is fresh enough.
        let err = selector
            .select(&snapshot, &criteria, 10, Duration::from_nanos(0))
            .unwrap_err();
        assert_matches!(err, FleetError::NoCandidates);
    }

    #[test]
    fn capability_filter_is_superset() {
        let (tx, _rx) = mpsc::channel(8);
        let reg = RegisterFrame {
            edge_id: "edge-a".into(),
            capabilities: EdgeCapabilities {
                tools: true,
                streaming: false,
                ..EdgeCapabilities::default()
            },
            ..RegisterFrame::default()
        };
        let plain = Arc::new(EdgeConnection::new("edge-a".into(), reg, tx));

        let criteria = SelectionCriteria {
            capabilities: Some(EdgeCapabilities {
                streaming: true,
                ..EdgeCapabilities::default()
            }),
            ..SelectionCriteria::default()
        };
        assert!(!criteria.matches(&plain, HB_TIMEOUT));

        let criteria_tools = SelectionCriteria {
            capabilities: Some(EdgeCapabilities {
                tools: true,
                ..EdgeCapabilities::default()
            }),
            ..SelectionCriteria::default()
        };
        assert!(criteria_tools.matches(&plain, HB_TIMEOUT));
    }

    #[test]
    fn metadata_filter_missing_key_no_match() {
        let (tx, _rx) = mpsc::channel(8);
        let reg = RegisterFrame {
            edge_id: "edge-a".into(),
            metadata: [("os".to_string(), "macos".to_string())].into(),
            ..RegisterFrame::default()
        };
        let conn = Arc::new(EdgeConnection::new("edge-a".into(), reg, tx));

        let mut criteria = SelectionCriteria::default();
        let _ = criteria.metadata.insert("os".into(), "macos".into());
        assert!(criteria.matches(&conn, HB_TIMEOUT));

        let _ = criteria.metadata.insert("arch".into(), "arm64".into());
        assert!(!criteria.matches(&conn, HB_TIMEOUT));
    }

    #[test]
    fn metadata_empty_value_is_skipped() {
        let (tx, _rx) = mpsc::channel(8);
        let conn = Arc::new(EdgeConnection::new(
            "edge-a".into(),
            RegisterFrame::default(),
            tx,
        ));
        let mut criteria = SelectionCriteria::default();
        let _ = criteria.metadata.insert("os".into(), String::new());
        assert!(criteria.matches(&conn, HB_TIMEOUT));
    }

    #[test]
    fn channel_type_filter() {
        let (tx, _rx) = mpsc::channel(8);
        let reg = RegisterFrame {
            edge_id: "edge-a".into(),
            channel_types: vec!["imessage".into()],
            ..RegisterFrame::default()
        };
        let conn = Arc::new(EdgeConnection::new("edge-a".into(), reg, tx));

        let has = SelectionCriteria {
            channel_type: Some("imessage".into()),
            ..SelectionCriteria::default()
        };
        assert!(has.matches(&conn, HB_TIMEOUT));

        let missing = SelectionCriteria {
            channel_type: Some("signal".into()),
            ..SelectionCriteria::default()
        };
        assert!(!missing.matches(&conn, HB_TIMEOUT));
    }

    #[test]
    fn least_busy_prefers_lowest_load() {
        // edge-fast at 1/10 vs edge-busy at 7/10.
        let snapshot = sorted(vec![
            make_edge("edge-busy", &["browser.snapshot"], 7),
            make_edge("edge-fast", &["browser.snapshot"], 1),
        ]);
        let selector = Selector::new();
        let chosen = selector
            .select(
                &snapshot,
                &SelectionCriteria::for_tool("browser.snapshot"),
                10,
                HB_TIMEOUT,
            )
            .unwrap();
        assert_eq!(chosen.id, "edge-fast");
    }

    #[test]
    fn least_busy_tie_breaks_to_smallest_id() {
        let snapshot = sorted(vec![
            make_edge("edge-b", &["shell.exec"], 2),
            make_edge("edge-a", &["shell.exec"], 2),
            make_edge("edge-c", &["shell.exec"], 2),
        ]);
        let selector = Selector::new();
        let criteria = SelectionCriteria::for_tool("shell.exec");
        for _ in 0..5 {
            let chosen = selector.select(&snapshot, &criteria, 10, HB_TIMEOUT).unwrap();
            assert_eq!(chosen.id, "edge-a");
        }
    }

    #[test]
    fn round_robin_alternates_between_two() {
        let snapshot = sorted(vec![
            make_edge("edge-a", &["shell.exec"], 0),
            make_edge("edge-b", &["shell.exec"], 0),
        ]);
        let selector = Selector::new();
        let criteria = SelectionCriteria {
            strategy: SelectionStrategy::RoundRobin,
            ..SelectionCriteria::for_tool("shell.exec")
        };
        let first = selector.select(&snapshot, &criteria, 10, HB_TIMEOUT).unwrap();
        let second = selector.select(&snapshot, &criteria, 10, HB_TIMEOUT).unwrap();
        let third = selector.select(&snapshot, &criteria, 10, HB_TIMEOUT).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.id, third.id);
    }

    #[test]
    fn random_picks_a_candidate() {
        let snapshot = sorted(vec![
            make_edge("edge-a", &["shell.exec"], 0),
            make_edge("edge-b", &["shell.exec"], 0),
        ]);
        let selector = Selector::new();
        let criteria = SelectionCriteria {
            strategy: SelectionStrategy::Random,
            ..SelectionCriteria::for_tool("shell.exec")
        };
        for _ in 0..20 {
            let chosen = selector.select(&snapshot, &criteria, 10, HB_TIMEOUT).unwrap();
            assert!(chosen.id == "edge-a" || chosen.id == "edge-b");
        }
    }

    #[test]
    fn strategy_parse_lenient() {
        assert_eq!(SelectionStrategy::parse("round_robin"), SelectionStrategy::RoundRobin);
        assert_eq!(SelectionStrategy::parse("random"), SelectionStrategy::Random);
        assert_eq!(SelectionStrategy::parse("least_busy"), SelectionStrategy::LeastBusy);
        assert_eq!(SelectionStrategy::parse(""), SelectionStrategy::LeastBusy);
        assert_eq!(SelectionStrategy::parse("mystery"), SelectionStrategy::LeastBusy);
    }

    #[test]
    fn criteria_serde_defaults() {
        let criteria: SelectionCriteria = serde_json::from_str("{}").unwrap();
        assert!(criteria.tool_name.is_none());
        assert_eq!(criteria.strategy, SelectionStrategy::LeastBusy);
    }
}
