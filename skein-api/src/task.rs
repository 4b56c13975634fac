//! # Task Model
//!
//! A [`Task`] is the unit of work submitted to a pool. Once submitted it is
//! immutable; the pool tracks the attempt count on its own side.
//!
//! ## Payload and transfers
//!
//! The payload is an opaque `serde_json::Value` that is cloned for every
//! attempt, so each execution unit receives its own copy. Large binary
//! buffers go in [`Task::transfers`] instead: they are moved into the unit
//! rather than copied. The unit hands them back with its reply, so a retry
//! can move them again and a successful [`TaskOutput`] returns them to the
//! caller. A unit that crashes or times out keeps the buffers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::errors::TaskError;
use crate::types::{ErrorCallback, SuccessCallback, TaskId, UnitId};

/// A unit of work submitted to the pool.
#[derive(Clone)]
pub struct Task {
    /// Task identifier; generated on submission when absent.
    pub id: Option<TaskId>,
    /// Type tag used to route the task to a handler and for affinity scoring.
    pub task_type: String,
    /// Opaque payload, copied to the execution unit on each attempt.
    pub payload: Value,
    /// Higher values are dispatched first. Defaults to [`crate::priority::NORMAL`].
    pub priority: i32,
    /// Per-task timeout; falls back to the pool default when `None` or zero.
    pub timeout: Option<Duration>,
    /// Per-task retry budget; falls back to the pool default when `None`.
    pub max_retries: Option<u32>,
    /// Buffers moved to the execution unit instead of copied.
    pub transfers: Vec<Vec<u8>>,
    /// Invoked when the task resolves successfully.
    pub on_success: Option<SuccessCallback>,
    /// Invoked when the task is finally rejected.
    pub on_error: Option<ErrorCallback>,
}

impl Task {
    /// Create a task of the given type with default priority, timeout and retries.
    pub fn new(task_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: None,
            task_type: task_type.into(),
            payload,
            priority: crate::priority::NORMAL,
            timeout: None,
            max_retries: None,
            transfers: Vec::new(),
            on_success: None,
            on_error: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Attach a buffer that is moved, not copied, to the execution unit.
    pub fn with_transfer(mut self, buffer: Vec<u8>) -> Self {
        self.transfers.push(buffer);
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TaskOutput) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TaskError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("task_type", &self.task_type)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("transfers", &self.transfers.len())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// What an execution unit receives for one attempt of a task.
#[derive(Debug)]
pub struct TaskInput<'a> {
    pub task_id: &'a TaskId,
    pub task_type: &'a str,
    /// This attempt's private copy of the payload.
    pub payload: Value,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Transferred buffers, owned by the unit for the duration of the call.
    pub transfers: &'a mut Vec<Vec<u8>>,
}

/// Successful result of a task.
#[derive(Debug, Clone)]
pub struct TaskOutput {
    pub task_id: TaskId,
    /// Value returned by the handler.
    pub value: Value,
    /// Number of executions it took, including the successful one.
    pub attempts: u32,
    /// Unit that produced the value.
    pub unit_id: UnitId,
    /// Execution time of the successful attempt as measured on the unit.
    pub duration: Duration,
    /// Transferred buffers handed back by the unit.
    pub transfers: Vec<Vec<u8>>,
}
