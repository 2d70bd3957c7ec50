//! `nodes` crate — the `ExecutableNode` trait and built-in node implementations.
//!
//! Every unit of work the engine schedules implements [`ExecutableNode`].
//! The engine crate dispatches execution through this trait object.

pub mod error;
pub mod traits;
pub mod mock;
pub mod order;

pub use error::NodeError;
pub use traits::{ExecutableNode, Patch};
pub use tokio_util::sync::CancellationToken;
