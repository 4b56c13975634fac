#![doc = " Thread-based execution pool internals for skein."]
//!
//! ## Key Concepts
//! - Execution units: one OS thread per unit, fed through a flume channel
//! - Orchestrator: a single tokio task that owns every piece of scheduling
//!   state, so none of it needs a lock
//! - Events: units and timers report back over unbounded channels consumed
//!   by the orchestrator loop
//!
//! ## Layout
//! - [`unit`]: the execution unit wrapper, its messages and the
//!   orchestrator-side `UnitState` with the scoring function
//! - `scheduler`: submission, dispatch, unit selection, completion handling
//!   and the priority queue
//! - `lifecycle`: unit creation, reaping, fault handling and resizing
//! - `metrics`: pool-wide counters

pub mod error;
pub mod unit;

pub(crate) mod lifecycle;
pub(crate) mod metrics;
pub(crate) mod orchestrator;
pub(crate) mod reporter;
pub(crate) mod scheduler;

// Re-export key types for easier usage
pub use error::UnitError;
pub use unit::state::{score, TypeStats, UnitState};
