//! `engine` crate — node registry, dependency planning, and the execution engine.

pub mod models;
pub mod error;
pub mod dag;
pub mod context;
pub mod logger;
pub mod metrics;
pub mod propagate;
pub mod runner;
pub mod executor;

pub use models::{ErrorStrategy, NodeConfig, NodeDefinition, NodeSpec, Plan};
pub use error::EngineError;
pub use dag::build_plan;
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use metrics::{NodeOutcome, NodeStatus, RunMetrics};
pub use executor::{Engine, EngineConfig, RunResult};
