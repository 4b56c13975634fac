mod common;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use skein::{Task, TaskError};

    use crate::common::{pool_with_gate, test_config, wait_until};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_retry_then_success_reports_attempts() {
        let (pool, _open, _) = pool_with_gate(test_config(1).with_max_retries(3));

        // Fails twice, succeeds on the third execution
        let output = pool
            .execute(Task::new("flaky", json!(2)))
            .await
            .expect("task eventually succeeds");

        assert_eq!(output.attempts, 3);
        assert_eq!(output.value, json!(3));

        let status = wait_until(&pool, |s| s.metrics.tasks_completed == 1).await;
        assert_eq!(status.metrics.tasks_retried, 2);
        assert_eq!(status.metrics.tasks_failed, 0);

        pool.terminate().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_retry_exhaustion_rejects_with_last_error() {
        let (pool, _open, _) = pool_with_gate(test_config(1).with_max_retries(2));

        let error = pool
            .execute(Task::new("flaky", json!(10)).with_id("doomed"))
            .await
            .expect_err("task never succeeds");

        match error {
            TaskError::Execution {
                ref task_id,
                attempts,
                ref message,
            } => {
                assert_eq!(task_id.as_str(), "doomed");
                assert_eq!(attempts, 3);
                assert_eq!(message, "attempt 3 failed");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let status = wait_until(&pool, |s| s.metrics.tasks_failed == 1).await;
        assert_eq!(status.metrics.tasks_retried, 2);
        assert_eq!(status.metrics.tasks_completed, 0);
        // Handler errors are not held against the unit
        assert_eq!(status.units[0].error_count, 0);

        pool.terminate().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_task_retry_budget_overrides_pool_default() {
        let (pool, _open, _) = pool_with_gate(test_config(1).with_max_retries(5));

        let error = pool
            .execute(Task::new("fail", json!(null)).with_max_retries(0))
            .await
            .expect_err("no retries allowed");
        assert_eq!(error.attempts(), 1);

        let output = pool
            .execute(Task::new("flaky", json!(4)))
            .await
            .expect("pool default allows five retries");
        assert_eq!(output.attempts, 5);

        pool.terminate().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_backoff_parks_retries() {
        let config = test_config(1)
            .with_max_retries(1)
            .with_retry_backoff(Duration::from_millis(300), Duration::from_secs(1));
        let (pool, _open, _) = pool_with_gate(config);

        let ticket = pool.submit(Task::new("flaky", json!(1))).expect("submit");

        let status = wait_until(&pool, |s| s.parked_retries == 1).await;
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.busy_units, 0);

        let output = ticket.await.expect("retry succeeds");
        assert_eq!(output.attempts, 2);

        let status = wait_until(&pool, |s| s.parked_retries == 0 && s.metrics.tasks_completed == 1).await;
        assert_eq!(status.metrics.tasks_retried, 1);

        pool.terminate().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_error_callback_sees_final_error() {
        let (pool, _open, _) = pool_with_gate(test_config(1).with_max_retries(1));
        let (seen_tx, seen_rx) = flume::unbounded();

        let result = pool
            .execute(Task::new("fail", json!(null)).on_error(move |err| {
                let _ = seen_tx.send(err.attempts());
            }))
            .await;

        assert!(result.is_err());
        assert_eq!(seen_rx.try_iter().collect::<Vec<_>>(), vec![2]);

        pool.terminate().await;
    }
}
