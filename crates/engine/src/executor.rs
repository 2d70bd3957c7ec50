//! The engine: node registry, cached plan, and the batch loop.
//!
//! `Engine::execute` is the central orchestrator:
//! 1. Obtains the (cached) plan; planning errors end the run before any node runs.
//! 2. Walks the plan batch by batch. Every runnable node of a batch is run
//!    concurrently on its own task against the same context snapshot, and
//!    the batch is a barrier: the next one starts only once all have settled.
//! 3. Applies each node's error strategy, merges successful patches in plan
//!    order, and blocks dependents of gate-skipped nodes (and of failed
//!    `skip-dependents` nodes).
//! 4. Returns the merged context together with per-run metrics.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{instrument, Instrument, Span};

use nodes::NodeError;

use crate::context::apply_patch;
use crate::dag::build_plan;
use crate::logger::{Logger, TracingLogger};
use crate::metrics::{NodeOutcome, NodeStatus, RunMetrics};
use crate::models::{ErrorStrategy, NodeDefinition, Plan};
use crate::propagate::block_dependents;
use crate::runner::{run_node, NodeResult, NodeRun};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Engine-wide tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Upper bound on nodes of one batch running at the same time.
    /// `None` runs the whole batch at once; `Some(0)` is treated as `Some(1)`.
    pub max_concurrency: Option<usize>,
}

// ---------------------------------------------------------------------------
// Output of a run
// ---------------------------------------------------------------------------

/// The result of one `execute` call.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// `false` only when planning failed or a `fail`-strategy node failed.
    pub success: bool,
    /// Final context. After an abort, the context as of the start of the
    /// aborting batch.
    pub context: Value,
    pub metrics: RunMetrics,
    pub error: Option<EngineError>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Registry of nodes plus the machinery to run them.
///
/// Each engine owns its nodes and plan cache; engines share nothing, so any
/// number of them can run side by side. Registering a node needs `&mut self`
/// and running needs `&self`, so the node set cannot change under a run.
pub struct Engine {
    nodes: Vec<NodeDefinition>,
    ids: HashSet<String>,
    plan: OnceLock<Result<Plan, EngineError>>,
    logger: Arc<dyn Logger>,
    config: EngineConfig,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("nodes", &self.nodes)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an engine that logs through `tracing`.
    pub fn new() -> Self {
        Self::with_logger(Arc::new(TracingLogger))
    }

    pub fn with_logger(logger: Arc<dyn Logger>) -> Self {
        Self {
            nodes: Vec::new(),
            ids: HashSet::new(),
            plan: OnceLock::new(),
            logger,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a node. Invalidates the cached plan.
    ///
    /// Dependencies are not checked here; that happens at plan time.
    ///
    /// # Errors
    /// [`EngineError::DuplicateNode`] if the id is taken. The engine is left
    /// unchanged in that case.
    pub fn add_node(&mut self, node: NodeDefinition) -> Result<&mut Self, EngineError> {
        if !self.ids.insert(node.id().to_owned()) {
            return Err(EngineError::DuplicateNode(node.id().to_owned()));
        }
        self.nodes.push(node);
        self.plan.take();
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// The execution plan for the registered nodes, computed on first use
    /// and cached until the next [`add_node`](Self::add_node).
    pub fn plan(&self) -> Result<&Plan, EngineError> {
        self.plan
            .get_or_init(|| build_plan(self.nodes.iter().map(|n| &n.spec)))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Run every node against a copy of `initial`.
    #[instrument(skip_all, fields(nodes = self.nodes.len(), run_id = tracing::field::Empty))]
    pub async fn execute(&self, initial: &Value) -> RunResult {
        let mut metrics = RunMetrics::new(self.nodes.len());
        Span::current().record("run_id", tracing::field::display(metrics.run_id));

        let plan = match self.plan() {
            Ok(plan) => plan,
            Err(err) => {
                self.logger
                    .error("planning failed", &json!({ "error": err.to_string() }));
                metrics.finish();
                return RunResult {
                    success: false,
                    context: initial.clone(),
                    metrics,
                    error: Some(err),
                };
            }
        };

        self.logger.info(
            "starting run",
            &json!({
                "run_id": metrics.run_id.to_string(),
                "nodes": self.nodes.len(),
                "batches": plan.batches.len(),
            }),
        );

        let by_id: HashMap<&str, &NodeDefinition> =
            self.nodes.iter().map(|n| (n.id(), n)).collect();
        let semaphore = self
            .config
            .max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        let mut context = initial.clone();
        let mut blocked: HashSet<String> = HashSet::new();

        for (index, batch) in plan.batches.iter().enumerate() {
            let runnable: Vec<&NodeDefinition> = batch
                .iter()
                .filter(|id| !blocked.contains(id.as_str()))
                .filter_map(|id| by_id.get(id.as_str()).copied())
                .collect();
            if runnable.is_empty() {
                continue;
            }

            self.logger.info(
                "running batch",
                &json!({
                    "batch": index,
                    "nodes": runnable.iter().map(|n| n.id()).collect::<Vec<_>>(),
                }),
            );

            let snapshot = Arc::new(context.clone());
            let runs = self.run_batch(&runnable, snapshot, semaphore.as_ref()).await;

            // Every node of the batch has settled; record all of them before
            // policy decides whether the run goes on.
            for (def, run) in runnable.iter().zip(&runs) {
                metrics.record(def.id(), run.outcome.clone());
            }

            let mut merged = context.clone();
            for (def, run) in runnable.iter().zip(runs) {
                match run.result {
                    NodeResult::Success(patch) => apply_patch(&mut merged, patch),
                    NodeResult::ValidationSkipped | NodeResult::Disabled => {}
                    NodeResult::GateSkipped => self.block(def.id(), plan, &mut blocked, &mut metrics),
                    NodeResult::Failed(source) => match def.config().on_error {
                        ErrorStrategy::Fail => {
                            let error = EngineError::NodeFailed {
                                node_id: def.id().to_owned(),
                                source,
                            };
                            self.logger.error(
                                "aborting run",
                                &json!({ "node": def.id(), "error": error.to_string() }),
                            );
                            metrics.finish();
                            return RunResult {
                                success: false,
                                context,
                                metrics,
                                error: Some(error),
                            };
                        }
                        ErrorStrategy::Skip => {
                            self.logger.warn(
                                "node failed, continuing",
                                &json!({ "node": def.id(), "error": source.to_string() }),
                            );
                        }
                        ErrorStrategy::SkipDependents => {
                            self.logger.warn(
                                "node failed, blocking its dependents",
                                &json!({ "node": def.id(), "error": source.to_string() }),
                            );
                            self.block(def.id(), plan, &mut blocked, &mut metrics);
                        }
                    },
                }
            }
            context = merged;
        }

        metrics.finish();
        self.logger.info(
            "run finished",
            &json!({
                "run_id": metrics.run_id.to_string(),
                "successful": metrics.successful,
                "failed": metrics.failed,
                "skipped": metrics.skipped,
                "blocked": metrics.blocked,
            }),
        );

        RunResult {
            success: true,
            context,
            metrics,
            error: None,
        }
    }

    /// Run one batch concurrently and wait for every node to settle.
    ///
    /// Results come back in the order of `batch`, regardless of which node
    /// finished first.
    async fn run_batch(
        &self,
        batch: &[&NodeDefinition],
        snapshot: Arc<Value>,
        semaphore: Option<&Arc<Semaphore>>,
    ) -> Vec<NodeRun> {
        let handles: Vec<_> = batch
            .iter()
            .map(|def| {
                let def = (*def).clone();
                let ctx = snapshot.clone();
                let logger = self.logger.clone();
                let semaphore = semaphore.cloned();
                tokio::spawn(
                    async move {
                        let _permit = match semaphore {
                            Some(sem) => sem.acquire_owned().await.ok(),
                            None => None,
                        };
                        run_node(&def, ctx, logger.as_ref()).await
                    }
                    .instrument(Span::current()),
                )
            })
            .collect();

        let mut runs = Vec::with_capacity(handles.len());
        for handle in handles {
            let run = match handle.await {
                Ok(run) => run,
                // The gate or validation hook panicked.
                Err(join_err) => {
                    let error = NodeError::Execution(format!("node panicked: {join_err}"));
                    NodeRun {
                        outcome: NodeOutcome {
                            status: NodeStatus::Failed,
                            attempts: 0,
                            duration: Duration::ZERO,
                            error: Some(error.to_string()),
                        },
                        result: NodeResult::Failed(error),
                    }
                }
            };
            runs.push(run);
        }
        runs
    }

    fn block(
        &self,
        node_id: &str,
        plan: &Plan,
        blocked: &mut HashSet<String>,
        metrics: &mut RunMetrics,
    ) {
        let newly = block_dependents(node_id, plan, blocked, metrics);
        if !newly.is_empty() {
            self.logger.info(
                "blocked dependents",
                &json!({ "node": node_id, "blocked": newly }),
            );
        }
    }
}
