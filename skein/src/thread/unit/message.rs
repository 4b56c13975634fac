use std::fmt;
use std::time::Duration;

use serde_json::Value;
use skein_api::{TaskId, UnitId};

/// One attempt of a task, moved to a unit thread.
pub(crate) struct RunRequest {
    /// Dispatch sequence number echoed back in the unit's reply.
    pub ticket: u64,
    pub task_id: TaskId,
    pub task_type: String,
    pub payload: Value,
    pub attempt: u32,
    pub transfers: Vec<Vec<u8>>,
}

/// Messages from the orchestrator to a unit thread.
pub(crate) enum UnitRequest {
    Run(RunRequest),
    /// Run the handler's warm-up hook; nothing is reported back.
    WarmUp,
    Stop,
}

impl fmt::Debug for UnitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run(run) => f
                .debug_struct("Run")
                .field("ticket", &run.ticket)
                .field("task_id", &run.task_id)
                .field("task_type", &run.task_type)
                .field("attempt", &run.attempt)
                .field("payload", &"<payload>")
                .field("transfers", &run.transfers.len())
                .finish(),
            Self::WarmUp => f.write_str("WarmUp"),
            Self::Stop => f.write_str("Stop"),
        }
    }
}

/// Messages from a unit thread back to the orchestrator.
#[derive(Debug)]
pub(crate) enum UnitEvent {
    /// The handler returned, successfully or with an error.
    Completed {
        unit_id: UnitId,
        ticket: u64,
        outcome: Result<Value, String>,
        duration: Duration,
        transfers: Vec<Vec<u8>>,
    },
    /// The handler panicked. `ticket` is `None` when the panic came from the
    /// warm-up hook rather than a task.
    Crashed {
        unit_id: UnitId,
        ticket: Option<u64>,
        reason: String,
    },
    /// The unit thread has left its loop.
    Exited { unit_id: UnitId },
}
