use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use skein_api::{PoolConfig, Task, TaskError, TaskId, TaskOutput};

/// Sender half of a caller's result future.
pub(crate) type ReplySender = oneshot::Sender<Result<TaskOutput, TaskError>>;

/// A submitted task together with the future it must eventually settle.
///
/// Owned by the orchestrator; never shared with execution units.
pub(crate) struct QueuedEntry {
    pub task_id: TaskId,
    pub task: Task,
    pub reply: ReplySender,
    pub enqueued_at: Instant,
    /// Executions started so far.
    pub attempts: u32,
}

impl QueuedEntry {
    /// Wrap a task, generating its id when absent.
    pub fn new(mut task: Task, reply: ReplySender) -> Self {
        let task_id = task.id.take().unwrap_or_else(TaskId::generate);
        task.id = Some(task_id.clone());
        Self {
            task_id,
            task,
            reply,
            enqueued_at: Instant::now(),
            attempts: 0,
        }
    }

    pub fn priority(&self) -> i32 {
        self.task.priority
    }

    /// Effective timeout; a missing or zero task timeout means the pool default.
    pub fn timeout(&self, config: &PoolConfig) -> Duration {
        match self.task.timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => config.task_timeout,
        }
    }

    pub fn max_retries(&self, config: &PoolConfig) -> u32 {
        self.task.max_retries.unwrap_or(config.max_retries)
    }

    /// Whether another attempt is allowed after the current one failed.
    pub fn can_retry(&self, config: &PoolConfig) -> bool {
        self.attempts <= self.max_retries(config)
    }
}

impl fmt::Debug for QueuedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedEntry")
            .field("task_id", &self.task_id)
            .field("task_type", &self.task.task_type)
            .field("priority", &self.task.priority)
            .field("attempts", &self.attempts)
            .field("waiting", &self.enqueued_at.elapsed())
            .finish()
    }
}

/// Delay before retrying after the `failures`-th failed attempt.
///
/// `min(base * 2^(failures - 1), max)`; zero when `base` is zero.
pub(crate) fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    let exponent = failures.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent).unwrap_or(max).min(max)
}
