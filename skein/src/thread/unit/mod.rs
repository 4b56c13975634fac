//! # Execution Unit Module
//!
//! An execution unit runs tasks on its own OS thread, one at a time. The
//! orchestrator talks to it only through messages: [`message::UnitRequest`]s
//! in over a flume channel, [`message::UnitEvent`]s out over the
//! orchestrator's event channel.
//!
//! ## Key Concepts
//! - Isolation: the thread owns its request receiver and a shared, immutable
//!   handler; it never touches orchestrator state
//! - Panic recovery: a panicking handler is caught with `catch_unwind` and
//!   reported as a crash; the thread keeps serving requests
//! - Stopping: a stop flag makes the thread skip anything still queued, then
//!   exit after the request in progress
//!
//! ## Thread Safety
//! - `UnitState` (see [`state`]) is kept by the orchestrator, not here
//! - The stop flag is the only state shared with the thread

pub(crate) mod message;
pub mod state;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::Context;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};

use skein_api::{TaskHandler, TaskInput, UnitId};

use crate::logging;
use crate::thread::error::UnitError;

use self::message::{RunRequest, UnitEvent, UnitRequest};

/// Handle to one execution unit thread.
pub(crate) struct ExecutionUnit {
    id: UnitId,
    requests: flume::Sender<UnitRequest>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionUnit")
            .field("id", &self.id)
            .field("stopping", &self.stop_flag.load(Ordering::Relaxed))
            .field("pending_requests", &self.requests.len())
            .field("has_thread", &self.thread.is_some())
            .finish()
    }
}

impl ExecutionUnit {
    /// Spawn the unit thread.
    pub fn spawn(
        id: UnitId,
        name_prefix: &str,
        handler: Arc<dyn TaskHandler>,
        events: UnboundedSender<UnitEvent>,
    ) -> anyhow::Result<Self> {
        let (requests, receiver) = flume::unbounded();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_stop_flag = stop_flag.clone();
        let dispatch = logging::current_subscriber();

        let thread = std::thread::Builder::new()
            .name(format!("{}-{}", name_prefix, id.value()))
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    unit_main(id, handler, receiver, events, thread_stop_flag);
                });
            })
            .with_context(|| format!("failed to spawn thread for execution unit {}", id))?;

        Ok(Self {
            id,
            requests,
            stop_flag,
            thread: Some(thread),
        })
    }

    /// Queue a request for the unit thread.
    pub fn send(&self, request: UnitRequest) -> Result<(), UnitError> {
        if self.stop_flag.load(Ordering::Acquire) {
            return Err(UnitError::Stopping(self.id));
        }
        self.requests
            .send(request)
            .map_err(|_| UnitError::Disconnected(self.id))
    }

    /// Ask the unit to run its handler's warm-up hook.
    pub fn preheat(&self) -> Result<(), UnitError> {
        self.send(UnitRequest::WarmUp)
    }

    /// Signal the thread to stop and detach it.
    ///
    /// A thread in the middle of a handler call finishes that call first; its
    /// reply is discarded. Queued requests are skipped.
    pub fn stop(mut self) {
        self.signal_stop();
        // Detached; the thread exits on its own
        self.thread.take();
    }

    pub(crate) fn signal_stop(&self) {
        if !self.stop_flag.swap(true, Ordering::AcqRel) {
            let _ = self.requests.send(UnitRequest::Stop);
        }
    }
}

impl Drop for ExecutionUnit {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

/// Main loop of a unit thread.
fn unit_main(
    id: UnitId,
    handler: Arc<dyn TaskHandler>,
    requests: flume::Receiver<UnitRequest>,
    events: UnboundedSender<UnitEvent>,
    stop_flag: Arc<AtomicBool>,
) {
    let span = crate::unit_span!(id);
    let _guard = span.enter();
    crate::log_lifecycle!(id, "started");

    while let Ok(request) = requests.recv() {
        if stop_flag.load(Ordering::Acquire) {
            break;
        }

        let event = match request {
            UnitRequest::Run(run) => Some(run_task(id, handler.as_ref(), run)),
            UnitRequest::WarmUp => {
                trace!("warming up");
                panic::catch_unwind(AssertUnwindSafe(|| handler.warm_up()))
                    .err()
                    .map(|panic| UnitEvent::Crashed {
                        unit_id: id,
                        ticket: None,
                        reason: panic_message(panic),
                    })
            }
            UnitRequest::Stop => break,
        };

        if let Some(event) = event {
            if events.send(event).is_err() {
                // Orchestrator is gone
                break;
            }
        }
    }

    crate::log_lifecycle!(id, "stopped");
    let _ = events.send(UnitEvent::Exited { unit_id: id });
}

fn run_task(id: UnitId, handler: &dyn TaskHandler, run: RunRequest) -> UnitEvent {
    let RunRequest {
        ticket,
        task_id,
        task_type,
        payload,
        attempt,
        mut transfers,
    } = run;

    let span = crate::task_span!(task_id, task_type, attempt = attempt);
    let _guard = span.enter();

    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        handler.handle(TaskInput {
            task_id: &task_id,
            task_type: &task_type,
            payload,
            attempt,
            transfers: &mut transfers,
        })
    }));
    let duration = started.elapsed();

    match result {
        Ok(outcome) => {
            debug!(ok = outcome.is_ok(), duration_ms = duration.as_millis() as u64, "attempt finished");
            UnitEvent::Completed {
                unit_id: id,
                ticket,
                outcome,
                duration,
                transfers,
            }
        }
        Err(panic) => {
            let reason = panic_message(panic);
            warn!(%reason, "handler panicked");
            UnitEvent::Crashed {
                unit_id: id,
                ticket: Some(ticket),
                reason,
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    }
}
