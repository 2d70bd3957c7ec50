//! Single-node lifecycle: gate → validate → attempts → cleanup.
//!
//! The runner holds no state between nodes. It reads a context snapshot and
//! hands back either a patch or the reason the node did not produce one;
//! policy (merging, blocking, aborting) is left to the engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use nodes::{ExecutableNode, NodeError, Patch};

use crate::logger::Logger;
use crate::metrics::{NodeOutcome, NodeStatus};
use crate::models::NodeDefinition;

/// How a node's lifecycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeResult {
    /// The work item succeeded with this patch.
    Success(Patch),
    /// The gate check refused the node; its dependents must be blocked.
    GateSkipped,
    /// Validation refused the node; dependents are unaffected.
    ValidationSkipped,
    /// The node is disabled by configuration and completed as a no-op.
    Disabled,
    /// Every attempt failed; carries the last attempt's error.
    Failed(NodeError),
}

/// A settled node: what happened plus the record destined for metrics.
#[derive(Debug, Clone)]
pub struct NodeRun {
    pub result: NodeResult,
    pub outcome: NodeOutcome,
}

impl NodeRun {
    fn skipped(result: NodeResult, started: Instant) -> Self {
        Self {
            result,
            outcome: NodeOutcome {
                status: NodeStatus::Skipped,
                attempts: 0,
                duration: started.elapsed(),
                error: None,
            },
        }
    }
}

/// Drive `def` through its full lifecycle against `ctx`.
pub async fn run_node(def: &NodeDefinition, ctx: Arc<Value>, logger: &dyn Logger) -> NodeRun {
    let started = Instant::now();
    let id = def.id();
    let config = def.config();

    if !config.enabled {
        logger.info("node disabled, skipping", &json!({ "node": id }));
        return NodeRun::skipped(NodeResult::Disabled, started);
    }

    if !def.handler.gate_check(&ctx).await {
        logger.info(
            "gate check failed, skipping node and blocking dependents",
            &json!({ "node": id }),
        );
        return NodeRun::skipped(NodeResult::GateSkipped, started);
    }

    if !def.handler.validate(&ctx).await {
        logger.info("validation failed, skipping node", &json!({ "node": id }));
        return NodeRun::skipped(NodeResult::ValidationSkipped, started);
    }

    let mut attempt: u32 = 0;
    let result = loop {
        match run_attempt(def.handler.clone(), ctx.clone(), config.timeout()).await {
            Ok(patch) => break Ok(patch),
            Err(err) => {
                let remaining = config.max_retries.saturating_sub(attempt);
                logger.warn(
                    "node attempt failed",
                    &json!({
                        "node": id,
                        "attempt": attempt + 1,
                        "remaining": remaining,
                        "error": err.to_string(),
                    }),
                );
                if remaining == 0 {
                    break Err(err);
                }
                let delay = config.backoff(attempt);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    };

    if let Err(error) = run_cleanup(def.handler.clone(), ctx.clone()).await {
        logger.warn("node cleanup failed", &json!({ "node": id, "error": error }));
    }

    let attempts = attempt + 1;
    let duration = started.elapsed();
    match result {
        Ok(patch) => {
            logger.info(
                "node succeeded",
                &json!({ "node": id, "attempts": attempts, "duration_ms": millis(duration) }),
            );
            NodeRun {
                result: NodeResult::Success(patch),
                outcome: NodeOutcome {
                    status: NodeStatus::Success,
                    attempts,
                    duration,
                    error: None,
                },
            }
        }
        Err(err) => {
            logger.error(
                "node failed",
                &json!({ "node": id, "attempts": attempts, "error": err.to_string() }),
            );
            NodeRun {
                outcome: NodeOutcome {
                    status: NodeStatus::Failed,
                    attempts,
                    duration,
                    error: Some(err.to_string()),
                },
                result: NodeResult::Failed(err),
            }
        }
    }
}

/// One attempt under a fresh cancellation token and an optional deadline.
///
/// The work item runs on its own task. When the deadline passes the token
/// is cancelled and the task is detached: it keeps running until it
/// notices the cancellation (or finishes), but nobody waits for it.
async fn run_attempt(
    handler: Arc<dyn ExecutableNode>,
    ctx: Arc<Value>,
    timeout: Option<Duration>,
) -> Result<Patch, NodeError> {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let mut task = tokio::spawn(async move { handler.execute(&ctx, token).await });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.cancel();
                return Err(NodeError::Timeout(limit));
            }
        },
        None => task.await,
    };

    match joined {
        Ok(Ok(patch)) => Ok(patch),
        Ok(Err(err)) => Err(NodeError::execution(&err)),
        Err(join_err) => Err(NodeError::Execution(format!("work item panicked: {join_err}"))),
    }
}

/// Best-effort cleanup on its own task, so that neither an error nor a
/// panic in the hook can change the node's outcome.
async fn run_cleanup(handler: Arc<dyn ExecutableNode>, ctx: Arc<Value>) -> Result<(), String> {
    match tokio::spawn(async move { handler.cleanup(&ctx).await }).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(join_err) => Err(format!("cleanup panicked: {join_err}")),
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}
