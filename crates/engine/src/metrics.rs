//! Per-run metrics: one outcome record per node plus aggregate counters.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Terminal status of a node within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Success,
    Failed,
    Skipped,
    Blocked,
}

/// What happened to a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutcome {
    pub status: NodeStatus,
    /// Attempts of the work item actually started.
    pub attempts: u32,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub error: Option<String>,
}

fn serialize_millis<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(d.as_millis().try_into().unwrap_or(u64::MAX))
}

impl NodeOutcome {
    pub fn blocked() -> Self {
        Self {
            status: NodeStatus::Blocked,
            attempts: 0,
            duration: Duration::ZERO,
            error: None,
        }
    }
}

/// Metrics owned by exactly one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_nodes: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub blocked: usize,
    pub nodes: BTreeMap<String, NodeOutcome>,
}

impl RunMetrics {
    pub fn new(total_nodes: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            total_nodes,
            successful: 0,
            failed: 0,
            skipped: 0,
            blocked: 0,
            nodes: BTreeMap::new(),
        }
    }

    /// Record a node's outcome and bump the matching counter.
    ///
    /// The first record for a node is final; later calls for the same id
    /// are ignored and return `false`.
    pub fn record(&mut self, node_id: &str, outcome: NodeOutcome) -> bool {
        if self.nodes.contains_key(node_id) {
            return false;
        }
        match outcome.status {
            NodeStatus::Success => self.successful += 1,
            NodeStatus::Failed => self.failed += 1,
            NodeStatus::Skipped => self.skipped += 1,
            NodeStatus::Blocked => self.blocked += 1,
        }
        self.nodes.insert(node_id.to_owned(), outcome);
        true
    }

    pub fn outcome(&self, node_id: &str) -> Option<&NodeOutcome> {
        self.nodes.get(node_id)
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.outcome(node_id).map(|o| o.status)
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock length of the run, once finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: NodeStatus) -> NodeOutcome {
        NodeOutcome {
            status,
            attempts: 1,
            duration: Duration::from_millis(3),
            error: None,
        }
    }

    #[test]
    fn counters_follow_recorded_statuses() {
        let mut metrics = RunMetrics::new(4);
        metrics.record("a", outcome(NodeStatus::Success));
        metrics.record("b", outcome(NodeStatus::Failed));
        metrics.record("c", outcome(NodeStatus::Skipped));
        metrics.record("d", NodeOutcome::blocked());

        assert_eq!(
            (metrics.successful, metrics.failed, metrics.skipped, metrics.blocked),
            (1, 1, 1, 1)
        );
        assert_eq!(metrics.status("d"), Some(NodeStatus::Blocked));
        assert_eq!(metrics.outcome("d").unwrap().attempts, 0);
    }

    #[test]
    fn first_record_wins() {
        let mut metrics = RunMetrics::new(1);
        assert!(metrics.record("a", NodeOutcome::blocked()));
        assert!(!metrics.record("a", outcome(NodeStatus::Success)));

        assert_eq!(metrics.status("a"), Some(NodeStatus::Blocked));
        assert_eq!(metrics.successful, 0);
        assert_eq!(metrics.blocked, 1);
    }

    #[test]
    fn outcome_duration_serializes_as_millis() {
        let value = serde_json::to_value(outcome(NodeStatus::Success)).unwrap();
        assert_eq!(value["duration_ms"], 3);
        assert_eq!(value["status"], "success");
        assert!(value.get("duration").is_none());
    }

    #[test]
    fn duration_is_known_once_finished() {
        let mut metrics = RunMetrics::new(0);
        assert!(metrics.duration().is_none());
        metrics.finish();
        assert!(metrics.duration().unwrap() >= chrono::Duration::zero());
    }
}
