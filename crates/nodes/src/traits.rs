//! The `ExecutableNode` trait — the contract every node must fulfil.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Partial update to the run context returned by a successful node.
///
/// Top-level keys present in the patch replace the same keys in the
/// context wholesale; nested objects are *not* merged recursively.
pub type Patch = Map<String, Value>;

/// The core node trait.
///
/// Only [`execute`](ExecutableNode::execute) is required. The gate,
/// validation and cleanup hooks default to "pass" / no-op, which is the
/// same as the node not declaring that capability at all.
///
/// Every hook receives a read-only snapshot of the context as it stood at
/// the start of the node's batch. Nodes never mutate the context directly;
/// they return a [`Patch`] instead.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Run the node's work item.
    ///
    /// `cancel` is fresh for every attempt and is triggered when the attempt
    /// exceeds its timeout. Cancellation is cooperative: the engine stops
    /// waiting for the attempt, but only the work item itself can stop the
    /// work, by observing the token.
    async fn execute(&self, ctx: &Value, cancel: CancellationToken) -> anyhow::Result<Patch>;

    /// Gate check. Returning `false` skips this node *and* blocks every
    /// transitive dependent.
    async fn gate_check(&self, _ctx: &Value) -> bool {
        true
    }

    /// Validation. Returning `false` skips only this node; dependents run.
    async fn validate(&self, _ctx: &Value) -> bool {
        true
    }

    /// Best-effort cleanup, invoked once after the attempt loop finishes,
    /// whether it succeeded or exhausted its retries. Errors are logged and
    /// otherwise ignored.
    async fn cleanup(&self, _ctx: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}
