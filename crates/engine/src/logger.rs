//! The logging capability the engine reports through.
//!
//! The engine never talks to a logging backend directly; it is handed an
//! `Arc<dyn Logger>` at construction time. [`TracingLogger`] is the default
//! and forwards to `tracing`.

use serde_json::Value;

/// Diagnostic sink with three severities. `meta` is structured context
/// about the event (node id, attempt, error text, ...).
pub trait Logger: Send + Sync {
    fn info(&self, message: &str, meta: &Value);
    fn warn(&self, message: &str, meta: &Value);
    fn error(&self, message: &str, meta: &Value);
}

/// Forwards every call to the matching `tracing` macro.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str, meta: &Value) {
        tracing::info!(%meta, "{message}");
    }

    fn warn(&self, message: &str, meta: &Value) {
        tracing::warn!(%meta, "{message}");
    }

    fn error(&self, message: &str, meta: &Value) {
        tracing::error!(%meta, "{message}");
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn info(&self, _message: &str, _meta: &Value) {}
    fn warn(&self, _message: &str, _meta: &Value) {}
    fn error(&self, _message: &str, _meta: &Value) {}
}

/// Keeps every message in memory, for assertions in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingLogger {
    entries: std::sync::Mutex<Vec<(&'static str, String, Value)>>,
}

#[cfg(test)]
impl RecordingLogger {
    fn push(&self, level: &'static str, message: &str, meta: &Value) {
        self.entries
            .lock()
            .unwrap()
            .push((level, message.to_owned(), meta.clone()));
    }

    /// Messages logged at `level`, in order.
    pub(crate) fn messages(&self, level: &str) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _, _)| *l == level)
            .map(|(_, m, _)| m.clone())
            .collect()
    }
}

#[cfg(test)]
impl Logger for RecordingLogger {
    fn info(&self, message: &str, meta: &Value) {
        self.push("info", message, meta);
    }

    fn warn(&self, message: &str, meta: &Value) {
        self.push("warn", message, meta);
    }

    fn error(&self, message: &str, meta: &Value) {
        self.push("error", message, meta);
    }
}
