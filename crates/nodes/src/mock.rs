//! `MockNode` — a test double for `ExecutableNode`.
//!
//! Useful in unit and integration tests where a real node implementation is
//! either unavailable or irrelevant.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{ExecutableNode, Patch};

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Succeed with the given patch.
    ReturnPatch(Patch),
    /// Fail every attempt with the given message.
    Fail(String),
    /// Fail the first `failures` attempts, then succeed with `then`.
    FailTimes {
        failures: u32,
        message: String,
        then: Patch,
    },
    /// Sleep for `duration` (or until cancelled), then succeed with `then`.
    Sleep { duration: Duration, then: Patch },
}

/// A mock node that records every call it receives and returns a
/// programmer-specified result.
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    /// What the node will do when `execute` is called.
    pub behaviour: MockBehaviour,
    gate: bool,
    valid: bool,
    cleanup_fails: bool,
    cleanup_panics: bool,
    /// Context snapshots seen by `execute`, one per attempt.
    calls: Mutex<Vec<Value>>,
    attempt_times: Mutex<Vec<Instant>>,
    attempts: AtomicU32,
    cleanups: AtomicUsize,
    cancelled: AtomicBool,
}

impl MockNode {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            gate: true,
            valid: true,
            cleanup_fails: false,
            cleanup_panics: false,
            calls: Mutex::new(Vec::new()),
            attempt_times: Mutex::new(Vec::new()),
            attempts: AtomicU32::new(0),
            cleanups: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Create a mock that always succeeds with the given patch.
    ///
    /// Non-object values are wrapped as `{ "<name>": value }`.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        let patch = into_patch(&name, value);
        Self::with_behaviour(name, MockBehaviour::ReturnPatch(patch))
    }

    /// Create a mock that marks its own completion: `{ "<name>": true }`.
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self::returning(name, Value::Bool(true))
    }

    /// Create a mock whose every attempt fails.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(msg.into()))
    }

    /// Create a mock that fails `failures` times and then succeeds.
    pub fn flaky(name: impl Into<String>, failures: u32, msg: impl Into<String>) -> Self {
        let name = name.into();
        let then = into_patch(&name, Value::Bool(true));
        Self::with_behaviour(
            name,
            MockBehaviour::FailTimes {
                failures,
                message: msg.into(),
                then,
            },
        )
    }

    /// Create a mock that takes `duration` to finish unless cancelled first.
    pub fn sleeping(name: impl Into<String>, duration: Duration) -> Self {
        let name = name.into();
        let then = into_patch(&name, Value::Bool(true));
        Self::with_behaviour(name, MockBehaviour::Sleep { duration, then })
    }

    /// Make the gate check refuse the node.
    pub fn gated_off(mut self) -> Self {
        self.gate = false;
        self
    }

    /// Make validation refuse the node.
    pub fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }

    /// Make cleanup return an error.
    pub fn with_failing_cleanup(mut self) -> Self {
        self.cleanup_fails = true;
        self
    }

    /// Make cleanup panic.
    pub fn with_panicking_cleanup(mut self) -> Self {
        self.cleanup_panics = true;
        self
    }

    /// Number of times `execute` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Context snapshots observed by `execute`, in call order.
    pub fn seen_contexts(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }

    /// Instants at which each attempt started.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times.lock().unwrap().clone()
    }

    /// Number of times `cleanup` has been called.
    pub fn cleanup_count(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    /// Whether a running attempt observed its cancellation token firing.
    pub fn observed_cancellation(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn into_patch(name: &str, value: Value) -> Patch {
    match value {
        Value::Object(map) => map,
        other => {
            let mut patch = Patch::new();
            patch.insert(name.to_owned(), other);
            patch
        }
    }
}

#[async_trait]
impl ExecutableNode for MockNode {
    async fn execute(&self, ctx: &Value, cancel: CancellationToken) -> anyhow::Result<Patch> {
        self.calls.lock().unwrap().push(ctx.clone());
        self.attempt_times.lock().unwrap().push(Instant::now());
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        match &self.behaviour {
            MockBehaviour::ReturnPatch(patch) => Ok(patch.clone()),
            MockBehaviour::Fail(msg) => Err(anyhow::anyhow!("{msg}")),
            MockBehaviour::FailTimes {
                failures,
                message,
                then,
            } => {
                if attempt < *failures {
                    Err(anyhow::anyhow!("{message} (attempt {})", attempt + 1))
                } else {
                    Ok(then.clone())
                }
            }
            MockBehaviour::Sleep { duration, then } => {
                tokio::select! {
                    _ = tokio::time::sleep(*duration) => Ok(then.clone()),
                    _ = cancel.cancelled() => {
                        self.cancelled.store(true, Ordering::SeqCst);
                        Err(anyhow::anyhow!("{} cancelled", self.name))
                    }
                }
            }
        }
    }

    async fn gate_check(&self, _ctx: &Value) -> bool {
        self.gate
    }

    async fn validate(&self, _ctx: &Value) -> bool {
        self.valid
    }

    async fn cleanup(&self, _ctx: &Value) -> anyhow::Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        if self.cleanup_panics {
            panic!("{} cleanup exploded", self.name);
        }
        if self.cleanup_fails {
            anyhow::bail!("{} cleanup failed", self.name);
        }
        Ok(())
    }
}
