use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use skein_api::Logger;

/// Emits orchestrator diagnostics to `tracing` and, when one was injected, to
/// the host's [`Logger`].
///
/// A panicking logger or user callback is caught here; it never reaches the
/// orchestrator loop.
#[derive(Clone, Default)]
pub(crate) struct Reporter {
    logger: Option<Arc<dyn Logger>>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("has_logger", &self.logger.is_some())
            .finish()
    }
}

impl Reporter {
    pub fn new(logger: Option<Arc<dyn Logger>>) -> Self {
        Self { logger }
    }

    pub fn debug(&self, message: &str, data: Value) {
        debug!(target: "skein::pool", %data, "{}", message);
        self.forward(message, &data, |logger, message, data| logger.debug(message, data));
    }

    pub fn info(&self, message: &str, data: Value) {
        info!(target: "skein::pool", %data, "{}", message);
        self.forward(message, &data, |logger, message, data| logger.info(message, data));
    }

    pub fn warn(&self, message: &str, data: Value) {
        warn!(target: "skein::pool", %data, "{}", message);
        self.forward(message, &data, |logger, message, data| logger.warn(message, data));
    }

    pub fn error(&self, message: &str, data: Value) {
        error!(target: "skein::pool", %data, "{}", message);
        self.forward(message, &data, |logger, message, data| logger.error(message, data));
    }

    fn forward<F>(&self, message: &str, data: &Value, call: F)
    where
        F: FnOnce(&dyn Logger, &str, Option<&Value>),
    {
        let Some(logger) = self.logger.as_deref() else {
            return;
        };
        let data = (!data.is_null()).then_some(data);
        if panic::catch_unwind(AssertUnwindSafe(|| call(logger, message, data))).is_err() {
            error!(target: "skein::pool", "injected logger panicked while logging '{}'", message);
        }
    }

    /// Run a user callback, logging instead of propagating a panic.
    pub fn guard_callback<F: FnOnce()>(&self, kind: &str, task_id: &str, callback: F) {
        if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
            self.error(
                "Task callback panicked",
                serde_json::json!({ "task_id": task_id, "callback": kind }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        lines: Mutex<Vec<(String, Option<Value>)>>,
    }

    impl Logger for Recording {
        fn warn(&self, message: &str, data: Option<&Value>) {
            self.lines
                .lock()
                .unwrap()
                .push((message.to_string(), data.cloned()));
        }
    }

    struct Panicking;

    impl Logger for Panicking {
        fn info(&self, _message: &str, _data: Option<&Value>) {
            panic!("logger exploded");
        }
    }

    #[test]
    fn test_forwards_message_and_data() {
        let recording = Arc::new(Recording::default());
        let reporter = Reporter::new(Some(recording.clone() as Arc<dyn Logger>));

        reporter.warn("Task retrying", serde_json::json!({ "attempt": 2 }));
        reporter.warn("No data", Value::Null);
        // Default no-op method on the logger
        reporter.info("ignored", Value::Null);

        let lines = recording.lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, "Task retrying");
        assert_eq!(lines[0].1, Some(serde_json::json!({ "attempt": 2 })));
        assert_eq!(lines[1].1, None);
    }

    #[test]
    fn test_panicking_logger_and_callback_are_contained() {
        let reporter = Reporter::new(Some(Arc::new(Panicking) as Arc<dyn Logger>));
        reporter.info("boom", Value::Null);

        let mut ran = false;
        reporter.guard_callback("on_success", "t-1", || {
            ran = true;
            panic!("callback exploded");
        });
        assert!(ran);
    }
}
