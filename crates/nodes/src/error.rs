//! Node-level error type.

use std::time::Duration;

use thiserror::Error;

/// Why a single attempt of a node's work item failed.
///
/// Both variants count against the node's retry budget. The string payload
/// of `Execution` is the work item's error rendered with its cause chain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The attempt did not finish before the configured deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The work item returned an error (or panicked).
    #[error("{0}")]
    Execution(String),
}

impl NodeError {
    /// Wrap an error raised by a work item, keeping its context chain.
    pub fn execution(err: &anyhow::Error) -> Self {
        Self::Execution(format!("{err:#}"))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn execution_error_keeps_cause_chain() {
        let err = Err::<(), _>(anyhow::anyhow!("connection reset"))
            .context("charging card")
            .unwrap_err();
        let node_err = NodeError::execution(&err);
        assert_eq!(node_err.to_string(), "charging card: connection reset");
        assert!(!node_err.is_timeout());
    }

    #[test]
    fn timeout_message_names_the_deadline() {
        let err = NodeError::Timeout(Duration::from_millis(50));
        assert_eq!(err.to_string(), "timed out after 50ms");
        assert!(err.is_timeout());
    }
}
