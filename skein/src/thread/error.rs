use thiserror::Error;

use skein_api::UnitId;

/// Errors talking to an execution unit thread.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    /// The unit's request channel is closed; its thread has exited.
    #[error("Execution unit {0} is disconnected")]
    Disconnected(UnitId),

    /// The unit has been asked to stop and accepts no more requests.
    #[error("Execution unit {0} is stopping")]
    Stopping(UnitId),
}
