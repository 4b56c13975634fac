//! # Skein Task Pool API
//!
//! Skein distributes units of work across an elastic pool of isolated
//! execution units. Each unit runs one task at a time and only talks to the
//! orchestrator through messages, never through shared mutable state.
//!
//! This crate holds the programming model: what a task looks like, how work
//! is executed on a unit, how a pool is configured and observed, and which
//! errors a caller can see. The runtime lives in the `skein` crate.
//!
//! ## Core Components
//!
//! - **Tasks**: [`Task`] carries a type tag, an opaque JSON payload, a
//!   priority, a timeout and a retry budget
//! - **Handlers**: [`TaskHandler`] runs on the execution unit threads;
//!   [`HandlerRegistry`] routes by task type
//! - **Configuration**: [`PoolConfig`] bounds the pool and tunes scheduling
//! - **Observation**: [`PoolStatus`] and [`PoolMetrics`] snapshots
//! - **Errors**: [`TaskError`] for task futures, [`PoolError`] for pool operations
//! - **Logging**: the optional [`Logger`] collaborator
//!
//! ## Usage Example
//!
//! ```rust
//! use serde_json::json;
//! use skein_api::{HandlerRegistry, Task, priority};
//!
//! let handlers = HandlerRegistry::new()
//!     .register("sum", |input| {
//!         let numbers: Vec<i64> = serde_json::from_value(input.payload)
//!             .map_err(|e| e.to_string())?;
//!         Ok(json!(numbers.iter().sum::<i64>()))
//!     });
//!
//! let task = Task::new("sum", json!([1, 2, 3])).with_priority(priority::HIGH);
//! assert_eq!(task.priority, priority::HIGH);
//! # drop(handlers);
//! ```
//!
//! ## Module Organization
//!
//! - [`task`]: tasks, task inputs and outputs
//! - [`types`]: identifiers and callback aliases
//! - [`handler`]: the execution-side handler trait and registry
//! - [`config`]: pool configuration
//! - [`status`]: status and metrics snapshots
//! - [`errors`]: error taxonomy
//! - [`logger`]: the logger collaborator
//! - [`priority`]: priority constants

pub mod config;
pub mod errors;
pub mod handler;
pub mod logger;
pub mod priority;
pub mod status;
pub mod task;
pub mod types;

pub use config::PoolConfig;
pub use errors::{PoolError, TaskError};
pub use handler::{handler_fn, FnHandler, HandlerRegistry, TaskHandler};
pub use logger::{Logger, TracingLogger};
pub use status::{PoolMetrics, PoolStatus, UnitSnapshot};
pub use task::{Task, TaskInput, TaskOutput};
pub use types::{ErrorCallback, SuccessCallback, TaskId, UnitId};
