//! Priority constants for [`crate::Task::with_priority`].
//!
//! Priorities are plain integers: higher values are dispatched first and any
//! value is accepted. These constants give names to the common bands.
//!
//! # Usage
//!
//! ```rust
//! use serde_json::Value;
//! use skein_api::{Task, priority};
//!
//! let urgent = Task::new("render", Value::Null).with_priority(priority::CRITICAL);
//! let chore = Task::new("cleanup", Value::Null).with_priority(priority::BACKGROUND);
//! assert!(urgent.priority > chore.priority);
//! ```

/// Background priority (-20)
pub const BACKGROUND: i32 = -20;

/// Low priority (-10)
pub const LOW: i32 = -10;

/// Normal priority (0), the default
pub const NORMAL: i32 = 0;

/// High priority (10)
pub const HIGH: i32 = 10;

/// Critical priority (20)
pub const CRITICAL: i32 = 20;
