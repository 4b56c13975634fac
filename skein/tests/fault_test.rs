mod common;

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use skein::{Task, TaskError, UnitId};

    use crate::common::{pool_with_gate, test_config, wait_until};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_resets_unit_without_terminating_it() {
        let (pool, _open, _) = pool_with_gate(test_config(1).with_units(1, 1));

        let error = pool
            .execute(
                Task::new("sleep", json!(500))
                    .with_timeout(Duration::from_millis(100))
                    .with_max_retries(0),
            )
            .await
            .expect_err("task times out");

        match error {
            TaskError::Timeout { attempts, timeout, .. } => {
                assert_eq!(attempts, 1);
                assert_eq!(timeout, Duration::from_millis(100));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let status = wait_until(&pool, |s| s.metrics.tasks_timed_out == 1).await;
        assert_eq!(status.unit_count, 1);
        assert_eq!(status.busy_units, 0);
        assert_eq!(status.units[0].id, UnitId::new(1));
        assert_eq!(status.units[0].error_count, 1);
        assert_eq!(status.metrics.units_terminated, 0);

        // The same unit serves the next task once its stuck call returns
        let output = pool.execute(Task::new("echo", json!("after"))).await.expect("echo");
        assert_eq!(output.unit_id, UnitId::new(1));

        pool.terminate().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timed_out_task_is_retried_and_stale_reply_ignored() {
        let (pool, _open, _) = pool_with_gate(test_config(1).with_units(1, 1));

        // The first attempt overruns; the retry queues behind it on the same
        // unit and finishes well within its own deadline
        let output = pool
            .execute(
                Task::new("sleep_first", json!(1500))
                    .with_timeout(Duration::from_millis(1000))
                    .with_max_retries(1),
            )
            .await
            .expect("retry succeeds");

        assert_eq!(output.attempts, 2);
        assert_eq!(output.value, json!(2));

        let status = wait_until(&pool, |s| s.metrics.tasks_completed == 1).await;
        assert_eq!(status.metrics.tasks_timed_out, 1);
        assert_eq!(status.metrics.tasks_retried, 1);
        // Only the retry's reply was accepted
        assert_eq!(status.units[0].tasks_completed, 1);

        pool.terminate().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_retry_after_timeout_avoids_unit_still_running_it() {
        let (pool, _open, _) = pool_with_gate(test_config(2).with_units(1, 2));

        // Unit 1 is still inside the first attempt when the retry is issued
        let output = pool
            .execute(
                Task::new("sleep_first", json!(2000))
                    .with_timeout(Duration::from_millis(200))
                    .with_max_retries(1),
            )
            .await
            .expect("retry runs on a fresh unit");

        assert_eq!(output.attempts, 2);
        assert_eq!(output.value, json!(2));
        assert_eq!(output.unit_id, UnitId::new(2));

        let status = pool.status();
        assert_eq!(status.metrics.units_created, 2);
        let first = status
            .units
            .iter()
            .find(|unit| unit.id == UnitId::new(1))
            .expect("unit 1 is kept");
        assert!(first.draining);
        assert!(!first.busy);

        // Available again once the abandoned attempt returns
        let status = wait_until(&pool, |s| s.units.iter().all(|unit| !unit.draining)).await;
        assert_eq!(status.unit_count, 2);
        assert_eq!(status.metrics.units_terminated, 0);

        pool.terminate().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_repeated_timeouts_replace_unit() {
        let config = test_config(1)
            .with_units(1, 1)
            .with_max_retries(0)
            .with_unit_error_threshold(1);
        let (pool, _open, _) = pool_with_gate(config);

        // The second task waits for unit 1 to drain, then times out as well
        for _ in 0..2 {
            let error = pool
                .execute(Task::new("sleep", json!(300)).with_timeout(Duration::from_millis(100)))
                .await
                .expect_err("task times out");
            assert!(matches!(error, TaskError::Timeout { attempts: 1, .. }));
        }

        let status = wait_until(&pool, |s| s.metrics.units_replaced == 1).await;
        assert_eq!(status.metrics.tasks_timed_out, 2);
        assert_eq!(status.metrics.units_terminated, 1);
        assert_eq!(status.unit_count, 1);
        assert_eq!(status.units[0].id, UnitId::new(2));
        assert_eq!(status.units[0].error_count, 0);

        let output = pool.execute(Task::new("echo", json!(1))).await.expect("echo");
        assert_eq!(output.unit_id, UnitId::new(2));

        pool.terminate().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_repeated_crashes_replace_unit() {
        let config = test_config(1)
            .with_units(1, 1)
            .with_max_retries(0)
            .with_unit_error_threshold(1);
        let (pool, _open, _) = pool_with_gate(config);

        let first = pool
            .execute(Task::new("panic", json!(null)))
            .await
            .expect_err("handler panics");
        match first {
            TaskError::UnitCrash {
                attempts,
                unit_id,
                ref reason,
                ..
            } => {
                assert_eq!(attempts, 1);
                assert_eq!(unit_id, UnitId::new(1));
                assert_eq!(reason, "unit exploded");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let status = wait_until(&pool, |s| s.metrics.unit_crashes == 1).await;
        assert_eq!(status.units[0].id, UnitId::new(1));
        assert_eq!(status.units[0].error_count, 1);

        // Second crash exceeds the threshold of one
        pool.execute(Task::new("panic", json!(null)))
            .await
            .expect_err("handler panics again");

        let status = wait_until(&pool, |s| s.metrics.units_replaced == 1).await;
        assert_eq!(status.unit_count, 1);
        assert_eq!(status.units[0].id, UnitId::new(2));
        assert_eq!(status.units[0].error_count, 0);

        let output = pool.execute(Task::new("echo", json!(1))).await.expect("echo");
        assert_eq!(output.unit_id, UnitId::new(2));

        pool.terminate().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_crashed_task_is_retried() {
        let (pool, _open, _) = pool_with_gate(test_config(1).with_max_retries(1));

        let output = pool
            .execute(Task::new("panic_first", json!(null)))
            .await
            .expect("retry succeeds");
        assert_eq!(output.attempts, 2);

        let status = wait_until(&pool, |s| s.metrics.tasks_completed == 1).await;
        assert_eq!(status.metrics.unit_crashes, 1);
        assert_eq!(status.metrics.units_replaced, 0);
        // The unit survived its panic
        assert_eq!(status.units[0].id, UnitId::new(1));

        pool.terminate().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_callbacks_do_not_disturb_pool() {
        let (pool, _open, _) = pool_with_gate(test_config(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let output = pool
            .execute(Task::new("echo", json!("ok")).on_success(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                panic!("success callback exploded");
            }))
            .await
            .expect("result still delivered");
        assert_eq!(output.value, json!("ok"));

        let counter = calls.clone();
        let error = pool
            .execute(
                Task::new("fail", json!(null))
                    .with_max_retries(0)
                    .on_error(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        panic!("error callback exploded");
                    }),
            )
            .await;
        assert!(error.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let output = pool.execute(Task::new("echo", json!(2))).await.expect("pool still works");
        assert_eq!(output.value, json!(2));

        pool.terminate().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unknown_task_type_fails_without_crashing() {
        let (pool, _open, _) = pool_with_gate(test_config(1).with_max_retries(0));

        let error = pool
            .execute(Task::new("no-such-type", json!(null)))
            .await
            .expect_err("no handler");
        assert!(error.to_string().contains("no handler registered for task type 'no-such-type'"));

        let status = wait_until(&pool, |s| s.metrics.tasks_failed == 1).await;
        assert_eq!(status.metrics.unit_crashes, 0);

        pool.terminate().await;
    }
}
