// Skein Task Pool Implementation
//
// This crate provides the runtime for the skein task pool API: execution
// units on dedicated OS threads, a single-task orchestrator that schedules
// onto them, and the `Pool` handle callers hold.

pub mod logging;
pub mod pool;
pub mod thread;

// Re-export commonly used types
pub use pool::{Pool, TaskTicket};
pub use skein_api::*;
