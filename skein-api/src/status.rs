//! Point-in-time views of a pool, returned by `Pool::status()`.

use std::time::Duration;

use serde::Serialize;

use crate::types::{TaskId, UnitId};

/// Snapshot of the whole pool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStatus {
    /// Live execution units, including units retiring after a shrink.
    pub unit_count: usize,
    pub busy_units: usize,
    pub idle_units: usize,
    /// Tasks waiting for a unit.
    pub queue_size: usize,
    /// Tasks waiting out a retry backoff delay.
    pub parked_retries: usize,
    pub min_units: usize,
    pub max_units: usize,
    /// Set once the pool has shut down; no further submissions are accepted.
    pub terminated: bool,
    pub metrics: PoolMetrics,
    /// Per-unit detail, ordered by unit id.
    pub units: Vec<UnitSnapshot>,
}

/// Pool-wide counters accumulated since creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolMetrics {
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    /// Tasks rejected after exhausting their retry budget.
    pub tasks_failed: u64,
    /// Tasks rejected because the pool terminated.
    pub tasks_cancelled: u64,
    /// Individual retries scheduled.
    pub tasks_retried: u64,
    /// Individual attempts that hit their timeout.
    pub tasks_timed_out: u64,
    /// Individual attempts lost to a unit crash.
    pub unit_crashes: u64,
    pub units_created: u64,
    pub units_terminated: u64,
    /// Units terminated and replaced after crossing the error threshold.
    pub units_replaced: u64,
    pub peak_units: usize,
    pub peak_queue_size: usize,
    /// Mean execution time of successful attempts.
    pub average_task_time_ms: f64,
}

/// Snapshot of one execution unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub busy: bool,
    pub current_task: Option<TaskId>,
    pub tasks_completed: u64,
    pub error_count: u32,
    pub average_task_time_ms: f64,
    pub load: f64,
    /// Marked for termination once idle, after a shrink.
    pub retiring: bool,
    /// Timed out and still running the abandoned attempt; takes no work.
    pub draining: bool,
    pub age: Duration,
    pub idle_for: Duration,
}
