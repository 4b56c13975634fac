use anyhow::anyhow;
use skein_api::{PoolError, TaskError, TaskId, UnitId};
use std::error::Error;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error() {
        let error = TaskError::Timeout {
            task_id: TaskId::new("resize-image"),
            attempts: 2,
            timeout: Duration::from_millis(250),
        };

        assert_eq!(
            error.to_string(),
            "Task resize-image timed out after 250ms (attempts: 2)"
        );
        assert_eq!(error.task_id().as_str(), "resize-image");
        assert_eq!(error.attempts(), 2);
        assert!(error.is_retryable());
        assert!(error.source().is_none());
    }

    #[test]
    fn test_execution_error() {
        let error = TaskError::Execution {
            task_id: TaskId::new("t-7"),
            attempts: 3,
            message: "division by zero".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Task t-7 failed after 3 attempt(s): division by zero"
        );
        assert_eq!(error.attempts(), 3);
    }

    #[test]
    fn test_unit_crash_error() {
        let error = TaskError::UnitCrash {
            task_id: TaskId::new("t-9"),
            attempts: 1,
            unit_id: UnitId::new(4),
            reason: "index out of bounds".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Execution unit unit-4 crashed running task t-9 (attempts: 1): index out of bounds"
        );
    }

    #[test]
    fn test_pool_terminated_is_not_retryable() {
        let error = TaskError::PoolTerminated {
            task_id: TaskId::new("late"),
            attempts: 0,
        };

        assert!(!error.is_retryable());
        assert_eq!(error.attempts(), 0);
    }

    #[test]
    fn test_pool_error_messages() {
        assert_eq!(PoolError::Terminated.to_string(), "Pool has been terminated");
        assert_eq!(
            PoolError::Capacity { max_units: 4 }.to_string(),
            "Pool is at capacity (4 units)"
        );
        assert_eq!(
            PoolError::InvalidConfig("bad".into()).to_string(),
            "Invalid pool configuration: bad"
        );
    }

    #[test]
    fn test_spawn_error_from_anyhow() {
        let error: PoolError = anyhow!("thread limit reached").into();
        assert!(matches!(error, PoolError::Spawn(_)));
        assert_eq!(
            error.to_string(),
            "Failed to spawn execution unit: thread limit reached"
        );
    }
}
