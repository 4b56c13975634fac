//! Orchestrator-side bookkeeping for one execution unit.
//!
//! The unit thread never sees this record. It is created when the lifecycle
//! controller spins the unit up, mutated only on the orchestrator loop, and
//! dropped when the unit is terminated.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use skein_api::{TaskId, UnitId, UnitSnapshot};

/// Per-task-type execution statistics of a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TypeStats {
    pub count: u64,
    pub total_time_ms: f64,
}

impl TypeStats {
    pub fn average_time_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_time_ms / self.count as f64
        }
    }
}

/// State of one execution unit as seen by the orchestrator.
#[derive(Debug, Clone)]
pub struct UnitState {
    pub id: UnitId,
    pub busy: bool,
    pub current_task: Option<TaskId>,
    pub tasks_completed: u64,
    /// Crashes and timeouts; only reset by replacing the unit.
    pub error_count: u32,
    pub created_at: Instant,
    pub last_used_at: Instant,
    /// Running mean over every completed attempt.
    pub average_task_time_ms: f64,
    pub task_type_stats: HashMap<String, TypeStats>,
    /// Recent-activity indicator in `0.0..=1.0`.
    pub load: f64,
    /// Terminate once idle instead of taking more work.
    pub retiring: bool,
    /// Ticket of a timed-out attempt the thread may still be running. The
    /// unit takes no work until that attempt's reply or crash arrives.
    pub draining: Option<u64>,
}

impl UnitState {
    pub fn new(id: UnitId, now: Instant) -> Self {
        Self {
            id,
            busy: false,
            current_task: None,
            tasks_completed: 0,
            error_count: 0,
            created_at: now,
            last_used_at: now,
            average_task_time_ms: 0.0,
            task_type_stats: HashMap::new(),
            load: 0.0,
            retiring: false,
            draining: None,
        }
    }

    /// Whether the unit can take a task right now.
    pub fn is_available(&self) -> bool {
        !self.busy && !self.retiring && self.draining.is_none()
    }

    /// Clear the draining mark if `ticket` is the attempt it waits for.
    pub fn finish_draining(&mut self, ticket: u64) -> bool {
        if self.draining == Some(ticket) {
            self.draining = None;
            true
        } else {
            false
        }
    }

    pub fn begin(&mut self, task_id: TaskId, now: Instant) {
        self.busy = true;
        self.current_task = Some(task_id);
        self.last_used_at = now;
    }

    /// Record a finished attempt, successful or not, and mark the unit idle.
    pub fn record_completion(&mut self, task_type: &str, duration: Duration, now: Instant) {
        let duration_ms = duration.as_secs_f64() * 1000.0;

        self.tasks_completed += 1;
        let n = self.tasks_completed as f64;
        self.average_task_time_ms = (self.average_task_time_ms * (n - 1.0) + duration_ms) / n;

        let stats = self.task_type_stats.entry(task_type.to_string()).or_default();
        stats.count += 1;
        stats.total_time_ms += duration_ms;

        self.load = (duration.as_secs_f64() / 10.0).min(1.0);
        self.release(now);
    }

    /// Count a crash or timeout against the unit.
    pub fn record_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    /// Mark the unit idle without touching its statistics.
    pub fn release(&mut self, now: Instant) {
        self.busy = false;
        self.current_task = None;
        self.last_used_at = now;
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        if self.busy {
            Duration::ZERO
        } else {
            now.saturating_duration_since(self.last_used_at)
        }
    }

    pub fn snapshot(&self, now: Instant) -> UnitSnapshot {
        UnitSnapshot {
            id: self.id,
            busy: self.busy,
            current_task: self.current_task.clone(),
            tasks_completed: self.tasks_completed,
            error_count: self.error_count,
            average_task_time_ms: self.average_task_time_ms,
            load: self.load,
            retiring: self.retiring,
            draining: self.draining.is_some(),
            age: now.saturating_duration_since(self.created_at),
            idle_for: self.idle_for(now),
        }
    }
}

/// Suitability of an idle unit for a task of `task_type`; higher is better.
///
/// ```text
/// score        = type_affinity + overall_perf + load_bonus - error_penalty
/// type_affinity = 100 - min(avg_time_for_type / 10, 100), or 30 if the type is new to the unit
/// overall_perf  = 100 - min(average_task_time_ms / 10, 100), or 50 before the first task
/// load_bonus    = (1 - load) * 50
/// error_penalty = error_count / tasks_completed * 100, or 0 before the first task
/// ```
pub fn score(unit: &UnitState, task_type: &str) -> f64 {
    let type_affinity = match unit.task_type_stats.get(task_type) {
        Some(stats) => 100.0 - (stats.average_time_ms() / 10.0).min(100.0),
        None => 30.0,
    };

    let (overall_perf, error_penalty) = if unit.tasks_completed > 0 {
        (
            100.0 - (unit.average_task_time_ms / 10.0).min(100.0),
            unit.error_count as f64 / unit.tasks_completed as f64 * 100.0,
        )
    } else {
        (50.0, 0.0)
    };

    let load_bonus = (1.0 - unit.load) * 50.0;

    type_affinity + overall_perf + load_bonus - error_penalty
}
