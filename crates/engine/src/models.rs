//! Core domain models for the engine.
//!
//! [`NodeSpec`] and [`NodeConfig`] are plain data and can be read from JSON
//! manifests; [`NodeDefinition`] pairs a spec with the code that runs it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nodes::ExecutableNode;

// ---------------------------------------------------------------------------
// ErrorStrategy
// ---------------------------------------------------------------------------

/// What a terminal node failure does to the rest of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorStrategy {
    /// Abort the run; no further batches execute.
    #[default]
    Fail,
    /// Record the failure and keep going. Dependents still run.
    Skip,
    /// Record the failure and block every transitive dependent.
    SkipDependents,
}

// ---------------------------------------------------------------------------
// NodeConfig
// ---------------------------------------------------------------------------

pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Per-node execution policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Deadline for a single attempt. `None` waits forever.
    pub timeout_ms: Option<u64>,
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Base delay for exponential back-off between attempts.
    pub retry_delay_ms: u64,
    pub on_error: ErrorStrategy,
    /// Disabled nodes complete as a no-op without running any hook.
    pub enabled: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            max_retries: 0,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            on_error: ErrorStrategy::Fail,
            enabled: true,
        }
    }
}

impl NodeConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(ceil_millis(timeout));
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay_ms = ceil_millis(retry_delay);
        self
    }

    pub fn with_on_error(mut self, strategy: ErrorStrategy) -> Self {
        self.on_error = strategy;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Back-off before the attempt following `attempt` (0-based):
    /// `retry_delay * 2^attempt`, saturating.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay()
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Whole milliseconds, rounding any sub-millisecond remainder up so that a
/// tiny non-zero duration never becomes zero.
fn ceil_millis(d: Duration) -> u64 {
    let ms = d.as_millis() + u128::from(d.subsec_nanos() % 1_000_000 != 0);
    u64::try_from(ms).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// NodeSpec / NodeDefinition
// ---------------------------------------------------------------------------

/// The declarative part of a node: identity, dependencies and policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique identifier within an engine.
    pub id: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub config: NodeConfig,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            config: NodeConfig::default(),
        }
    }
}

/// A registered node: its spec plus the implementation that runs it.
/// Immutable once handed to the engine.
#[derive(Clone)]
pub struct NodeDefinition {
    pub spec: NodeSpec,
    pub handler: Arc<dyn ExecutableNode>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, handler: Arc<dyn ExecutableNode>) -> Self {
        Self {
            spec: NodeSpec::new(id),
            handler,
        }
    }

    /// Convenience for handlers that are not shared elsewhere.
    pub fn from_node(id: impl Into<String>, node: impl ExecutableNode + 'static) -> Self {
        Self::new(id, Arc::new(node))
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.spec.config = config;
        self
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.spec.config
    }
}

impl fmt::Debug for NodeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDefinition")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// A validated execution plan.
///
/// `batches` partitions `order`: every dependency of a node in batch `k`
/// lives in a batch before `k`, and each batch holds every node whose
/// dependencies are satisfied by the batches before it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub order: Vec<String>,
    pub batches: Vec<Vec<String>>,
    /// node id -> ids of the nodes that declare it as a dependency.
    #[serde(skip)]
    pub(crate) dependents: HashMap<String, Vec<String>>,
}

impl Plan {
    /// Direct dependents of `id`, in registration order.
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_defaults_match_documented_values() {
        let config = NodeConfig::default();
        assert_eq!(config.timeout(), None);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.retry_delay(), Duration::from_millis(500));
        assert_eq!(config.on_error, ErrorStrategy::Fail);
        assert!(config.enabled);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let config = NodeConfig::default().with_retries(3, Duration::from_millis(10));
        assert_eq!(config.backoff(0), Duration::from_millis(10));
        assert_eq!(config.backoff(1), Duration::from_millis(20));
        assert_eq!(config.backoff(2), Duration::from_millis(40));
    }

    #[test]
    fn sub_millisecond_durations_round_up() {
        let config = NodeConfig::default()
            .with_timeout(Duration::from_micros(300))
            .with_retries(1, Duration::from_micros(1_500));
        assert_eq!(config.timeout_ms, Some(1));
        assert_eq!(config.retry_delay_ms, 2);

        let exact = NodeConfig::default().with_timeout(Duration::from_millis(50));
        assert_eq!(exact.timeout_ms, Some(50));
        assert_eq!(NodeConfig::default().with_timeout(Duration::ZERO).timeout_ms, Some(0));
    }

    #[test]
    fn spec_deserializes_with_defaults() {
        let spec: NodeSpec = serde_json::from_value(json!({
            "id": "ship",
            "depends_on": ["pay"],
            "config": { "on_error": "skip-dependents", "timeout_ms": 50 }
        }))
        .unwrap();

        assert_eq!(spec.depends_on, vec!["pay"]);
        assert_eq!(spec.config.on_error, ErrorStrategy::SkipDependents);
        assert_eq!(spec.config.timeout(), Some(Duration::from_millis(50)));
        assert_eq!(spec.config.retry_delay_ms, DEFAULT_RETRY_DELAY_MS);
        assert!(spec.config.enabled);
    }
}
