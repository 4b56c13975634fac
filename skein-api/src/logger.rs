//! # Logger Collaborator
//!
//! The pool always emits `tracing` events. A host application that routes its
//! diagnostics elsewhere can additionally inject a [`Logger`]; every pool log
//! line is then forwarded to it with a structured JSON payload. All methods
//! default to no-ops, and a pool created without a logger simply skips the
//! forwarding.

use serde_json::Value;

/// Sink for pool diagnostics, injected by the host application.
pub trait Logger: Send + Sync {
    fn debug(&self, _message: &str, _data: Option<&Value>) {}
    fn info(&self, _message: &str, _data: Option<&Value>) {}
    fn warn(&self, _message: &str, _data: Option<&Value>) {}
    fn error(&self, _message: &str, _data: Option<&Value>) {}
}

/// Logger that re-emits forwarded lines as `tracing` events under the
/// `skein::host` target, for hosts that want every line in one place.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str, data: Option<&Value>) {
        tracing::debug!(target: "skein::host", data = ?data, "{}", message);
    }

    fn info(&self, message: &str, data: Option<&Value>) {
        tracing::info!(target: "skein::host", data = ?data, "{}", message);
    }

    fn warn(&self, message: &str, data: Option<&Value>) {
        tracing::warn!(target: "skein::host", data = ?data, "{}", message);
    }

    fn error(&self, message: &str, data: Option<&Value>) {
        tracing::error!(target: "skein::host", data = ?data, "{}", message);
    }
}
