//! # Pool Error Types
//!
//! Two families of errors:
//!
//! - [`TaskError`] is what a task's future rejects with. Every variant carries
//!   the task id and the number of attempts made, and the last underlying
//!   failure. Timeouts, execution failures and unit crashes are only surfaced
//!   after the task's retry budget is exhausted.
//! - [`PoolError`] covers pool-level operations: configuration, resizing and
//!   unit creation.
//!
//! ## Usage Example
//!
//! ```rust
//! use skein_api::{TaskError, TaskId};
//!
//! fn describe(error: &TaskError) -> String {
//!     match error {
//!         TaskError::Timeout { timeout, .. } => format!("gave up after {timeout:?}"),
//!         TaskError::Execution { message, .. } => message.clone(),
//!         other => other.to_string(),
//!     }
//! }
//!
//! let error = TaskError::Execution {
//!     task_id: TaskId::new("t-1"),
//!     attempts: 3,
//!     message: "bad input".into(),
//! };
//! assert_eq!(describe(&error), "bad input");
//! assert_eq!(error.attempts(), 3);
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::types::{TaskId, UnitId};

/// Final error of a task, delivered through its future.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// The execution unit did not reply within the task's timeout.
    #[error("Task {task_id} timed out after {timeout:?} (attempts: {attempts})")]
    Timeout {
        task_id: TaskId,
        attempts: u32,
        timeout: Duration,
    },

    /// The handler reported a failure.
    #[error("Task {task_id} failed after {attempts} attempt(s): {message}")]
    Execution {
        task_id: TaskId,
        attempts: u32,
        message: String,
    },

    /// The execution unit crashed or could not be reached while running the task.
    #[error("Execution unit {unit_id} crashed running task {task_id} (attempts: {attempts}): {reason}")]
    UnitCrash {
        task_id: TaskId,
        attempts: u32,
        unit_id: UnitId,
        reason: String,
    },

    /// The pool was terminated before the task completed, or the task was
    /// submitted after termination.
    #[error("Pool terminated before task {task_id} completed (attempts: {attempts})")]
    PoolTerminated { task_id: TaskId, attempts: u32 },
}

impl TaskError {
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::Timeout { task_id, .. }
            | Self::Execution { task_id, .. }
            | Self::UnitCrash { task_id, .. }
            | Self::PoolTerminated { task_id, .. } => task_id,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Timeout { attempts, .. }
            | Self::Execution { attempts, .. }
            | Self::UnitCrash { attempts, .. }
            | Self::PoolTerminated { attempts, .. } => *attempts,
        }
    }

    /// Whether the failure kind is one the pool retries.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::PoolTerminated { .. })
    }
}

/// Errors from pool-level operations.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("Pool has been terminated")]
    Terminated,

    /// No more units may be created. Used internally to fall back to queuing;
    /// task submission never fails with this.
    #[error("Pool is at capacity ({max_units} units)")]
    Capacity { max_units: usize },

    #[error("Failed to spawn execution unit: {0}")]
    Spawn(#[from] anyhow::Error),

    /// The pool was created outside a Tokio runtime.
    #[error("Pool requires a Tokio runtime: {0}")]
    NoRuntime(String),
}
