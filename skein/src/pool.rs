//! # Pool
//!
//! [`Pool`] is the handle callers hold. It is cheap to clone; every clone
//! talks to the same orchestrator task over its command channel and reads
//! status from a watch channel the orchestrator refreshes after every event.
//!
//! Dropping the last handle shuts the pool down the same way
//! [`Pool::terminate`] does.
//!
//! ```rust,no_run
//! use serde_json::json;
//! use skein::{HandlerRegistry, Pool, PoolConfig, Task};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let handlers = HandlerRegistry::new().register("double", |input| {
//!     let n = input.payload.as_i64().ok_or("expected an integer")?;
//!     Ok(json!(n * 2))
//! });
//!
//! let pool = Pool::new(PoolConfig::default().with_units(1, 4), None, handlers)?;
//! let output = pool.execute(Task::new("double", json!(21))).await?;
//! assert_eq!(output.value, json!(42));
//!
//! let doubled = pool
//!     .parallel(1..=3, |n| Task::new("double", json!(n)))
//!     .await;
//! assert_eq!(doubled, vec![json!(2), json!(4), json!(6)]);
//!
//! pool.terminate().await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::join_all;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};

use skein_api::{Logger, PoolConfig, PoolError, PoolStatus, Task, TaskError, TaskHandler, TaskId, TaskOutput};

use crate::thread::orchestrator::{Command, Orchestrator};
use crate::thread::reporter::Reporter;
use crate::thread::scheduler::entry::QueuedEntry;

/// Handle to a running task pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<PoolStatus>,
    terminated: AtomicBool,
    reporter: Reporter,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.inner.status.borrow();
        f.debug_struct("Pool")
            .field("unit_count", &status.unit_count)
            .field("busy_units", &status.busy_units)
            .field("queue_size", &status.queue_size)
            .field("terminated", &status.terminated)
            .finish()
    }
}

impl Pool {
    /// Create a pool and start `config.min_units` execution units.
    ///
    /// Must be called from within a Tokio runtime; the orchestrator runs as a
    /// task on it. `handler` runs on the execution unit threads.
    pub fn new<H>(config: PoolConfig, logger: Option<Arc<dyn Logger>>, handler: H) -> Result<Self, PoolError>
    where
        H: TaskHandler,
    {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|err| PoolError::NoRuntime(err.to_string()))?;

        let reporter = Reporter::new(logger);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (unit_tx, unit_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(PoolStatus::default());

        let mut orchestrator = Orchestrator::new(
            config,
            Arc::new(handler),
            reporter.clone(),
            unit_tx,
            timer_tx,
            status_tx,
        );
        orchestrator.start()?;
        runtime.spawn(orchestrator.run(command_rx, unit_rx, timer_rx));

        Ok(Self {
            inner: Arc::new(PoolInner {
                commands: command_tx,
                status: status_rx,
                terminated: AtomicBool::new(false),
                reporter,
            }),
        })
    }

    /// Hand a task to the pool without waiting for it.
    ///
    /// The returned [`TaskTicket`] resolves once the task completes or is
    /// finally rejected.
    pub fn submit(&self, task: Task) -> Result<TaskTicket, PoolError> {
        if self.is_terminated() {
            return Err(PoolError::Terminated);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let entry = QueuedEntry::new(task, reply_tx);
        let task_id = entry.task_id.clone();

        self.inner
            .commands
            .send(Command::Submit(entry))
            .map_err(|_| PoolError::Terminated)?;

        Ok(TaskTicket {
            task_id,
            reply: reply_rx,
        })
    }

    /// Run a task and wait for its result.
    pub async fn execute(&self, task: Task) -> Result<TaskOutput, TaskError> {
        self.submit_or_reject(task)?.await
    }

    /// Run tasks concurrently; results come back in input order.
    ///
    /// Every task is submitted before any result is awaited, so the batch
    /// fans out across the pool.
    pub async fn execute_batch(&self, tasks: Vec<Task>) -> Vec<Result<TaskOutput, TaskError>> {
        let tickets: Vec<_> = tasks
            .into_iter()
            .map(|task| self.submit_or_reject(task))
            .collect();

        join_all(tickets.into_iter().map(|ticket| async move {
            match ticket {
                Ok(ticket) => ticket.await,
                Err(err) => Err(err),
            }
        }))
        .await
    }

    /// Map every item to a task, run them all, and collect the successful
    /// values in input order. Failures are logged and left out.
    pub async fn parallel<I, F>(&self, items: I, mapper: F) -> Vec<Value>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Task,
    {
        let tasks: Vec<Task> = items.into_iter().map(mapper).collect();
        let total = tasks.len();

        let values: Vec<Value> = self
            .execute_batch(tasks)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(output) => Some(output.value),
                Err(err) => {
                    self.inner.reporter.warn(
                        "Parallel task failed",
                        json!({
                            "task_id": err.task_id().as_str(),
                            "attempts": err.attempts(),
                            "error": err.to_string(),
                        }),
                    );
                    None
                }
            })
            .collect();

        if values.len() < total {
            self.inner.reporter.warn(
                "Parallel run finished with failures",
                json!({ "succeeded": values.len(), "failed": total - values.len() }),
            );
        }
        values
    }

    /// [`parallel`](Self::parallel), then fold the successful values.
    pub async fn parallel_reduce<I, F, A, R>(&self, items: I, mapper: F, init: A, reducer: R) -> A
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Task,
        R: FnMut(A, Value) -> A,
    {
        self.parallel(items, mapper).await.into_iter().fold(init, reducer)
    }

    /// Latest snapshot of the pool. Never fails, also after termination.
    pub fn status(&self) -> PoolStatus {
        self.inner.status.borrow().clone()
    }

    /// Change the pool bounds; `None` keeps the current value.
    pub async fn resize(&self, min_units: Option<usize>, max_units: Option<usize>) -> Result<(), PoolError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Resize {
                min_units,
                max_units,
                reply: reply_tx,
            })
            .map_err(|_| PoolError::Terminated)?;

        reply_rx.await.map_err(|_| PoolError::Terminated)?
    }

    /// Shut the pool down.
    ///
    /// Queued, backing-off and running tasks are rejected with
    /// [`TaskError::PoolTerminated`] and every unit is stopped. Returns once
    /// that has happened. Calling it again is a no-op.
    pub async fn terminate(&self) {
        self.inner.terminated.store(true, Ordering::Release);

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.inner.commands.send(Command::Terminate(ack_tx)).is_err() {
            return;
        }
        // Dropped unacknowledged when an earlier call already stopped the loop
        let _ = ack_rx.await;
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::Acquire)
    }

    fn submit_or_reject(&self, mut task: Task) -> Result<TaskTicket, TaskError> {
        let task_id = task.id.get_or_insert_with(TaskId::generate).clone();
        self.submit(task)
            .map_err(|_| TaskError::PoolTerminated { task_id, attempts: 0 })
    }
}

/// Future for the result of a submitted task.
#[derive(Debug)]
#[must_use = "a ticket does nothing unless awaited"]
pub struct TaskTicket {
    task_id: TaskId,
    reply: oneshot::Receiver<Result<TaskOutput, TaskError>>,
}

impl TaskTicket {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }
}

impl Future for TaskTicket {
    type Output = Result<TaskOutput, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.reply).poll(cx).map(|result| {
            // The orchestrator dropped the entry without settling it
            result.unwrap_or_else(|_| {
                Err(TaskError::PoolTerminated {
                    task_id: this.task_id.clone(),
                    attempts: 0,
                })
            })
        })
    }
}
