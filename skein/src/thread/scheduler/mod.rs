//! # Scheduler
//!
//! Submission, dispatch and completion handling for the orchestrator.
//!
//! ## Dispatch rules
//! - A task goes straight to an idle unit when one exists, or to a new unit
//!   while the pool is below `max_units`; otherwise it waits in the
//!   [`queue::TaskQueue`]
//! - A unit still running a timed-out attempt is draining and is skipped
//! - With smart scheduling on, idle units are ranked by
//!   [`score`](crate::thread::score); ties go to the unit idle longest
//! - Every time a unit becomes free the queue head is drained into the pool
//!
//! ## Failure handling
//! A failed attempt is retried while `attempts <= max_retries`, immediately
//! or after an exponential backoff, and rejected with the last error after
//! that.

pub(crate) mod entry;
pub(crate) mod queue;

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use skein_api::{TaskError, TaskOutput, UnitId};

use crate::thread::orchestrator::{InFlight, Orchestrator, TimerEvent};
use crate::thread::unit::message::{RunRequest, UnitEvent, UnitRequest};
use crate::thread::unit::state::score;

use self::entry::{backoff_delay, QueuedEntry};

impl Orchestrator {
    /// Accept a new task from a `Pool` handle.
    pub(crate) fn submit(&mut self, entry: QueuedEntry) {
        self.metrics.task_submitted();
        self.reporter.debug(
            "Task submitted",
            json!({
                "task_id": entry.task_id.as_str(),
                "task_type": entry.task.task_type,
                "priority": entry.priority(),
            }),
        );
        self.schedule(entry);
    }

    /// Dispatch `entry` now if possible, otherwise queue it.
    ///
    /// Tasks already waiting keep precedence: a non-empty queue takes the new
    /// entry first and is then drained in priority order.
    pub(crate) fn schedule(&mut self, entry: QueuedEntry) {
        if self.queue.is_empty() {
            if let Err(entry) = self.dispatch(entry) {
                self.enqueue(entry);
            }
        } else {
            self.enqueue(entry);
            self.drain_queue();
        }
    }

    fn enqueue(&mut self, entry: QueuedEntry) {
        self.reporter.debug(
            "Task queued",
            json!({
                "task_id": entry.task_id.as_str(),
                "priority": entry.priority(),
                "queue_size": self.queue.len() + 1,
            }),
        );
        self.queue.push(entry);
        self.metrics.observe_queue(self.queue.len());
    }

    /// Assign `entry` to an idle unit, growing the pool if needed.
    ///
    /// Hands the entry back when no unit can be obtained.
    ///
    /// A unit found unreachable is replaced and the next candidate tried, up
    /// to `max_units` extra times.
    pub(crate) fn dispatch(&mut self, mut entry: QueuedEntry) -> Result<(), QueuedEntry> {
        for _ in 0..=self.config.max_units {
            let unit_id = match self.find_idle_unit(&entry.task.task_type) {
                Some(unit_id) => unit_id,
                None if self.units.len() < self.config.max_units => match self.create_unit() {
                    Ok(unit_id) => unit_id,
                    Err(err) => {
                        self.reporter.error(
                            "Could not grow the pool",
                            json!({ "error": err.to_string(), "units": self.units.len() }),
                        );
                        return Err(entry);
                    }
                },
                None => return Err(entry),
            };

            // A refused assignment has already removed the unit
            match self.assign(unit_id, entry) {
                Ok(()) => return Ok(()),
                Err(back) => entry = back,
            }
        }
        Err(entry)
    }

    /// Pick the idle unit for a task of `task_type`.
    pub(crate) fn find_idle_unit(&self, task_type: &str) -> Option<UnitId> {
        let mut idle = self
            .units
            .values()
            .filter(|slot| slot.in_flight.is_none() && slot.state.is_available())
            .map(|slot| &slot.state);

        if !self.config.enable_smart_scheduling {
            return idle.next().map(|state| state.id);
        }

        idle.max_by(|a, b| {
            score(a, task_type)
                .total_cmp(&score(b, task_type))
                .then_with(|| b.last_used_at.cmp(&a.last_used_at))
                .then_with(|| b.id.cmp(&a.id))
        })
        .map(|state| state.id)
    }

    fn assign(&mut self, unit_id: UnitId, mut entry: QueuedEntry) -> Result<(), QueuedEntry> {
        let ticket = self.next_sequence();
        let timeout = entry.timeout(&self.config);
        let Some(slot) = self.units.get(&unit_id) else {
            return Err(entry);
        };

        entry.attempts += 1;
        let request = RunRequest {
            ticket,
            task_id: entry.task_id.clone(),
            task_type: entry.task.task_type.clone(),
            payload: entry.task.payload.clone(),
            attempt: entry.attempts,
            transfers: std::mem::take(&mut entry.task.transfers),
        };

        if let Err(err) = slot.unit.send(UnitRequest::Run(request)) {
            // The thread is gone; the attempt never started
            entry.attempts -= 1;
            self.reporter.error(
                "Execution unit unreachable",
                json!({ "unit_id": unit_id.to_string(), "error": err.to_string() }),
            );
            self.metrics.unit_crashed();
            // Idle unit, so nothing was in flight
            self.terminate_unit(unit_id, "unreachable");
            self.ensure_min_units();
            return Err(entry);
        }

        let timer = self.start_timer(timeout, TimerEvent::TaskTimeout { unit_id, ticket });
        let now = Instant::now();

        self.reporter.debug(
            "Task dispatched",
            json!({
                "task_id": entry.task_id.as_str(),
                "unit_id": unit_id.to_string(),
                "attempt": entry.attempts,
                "timeout_ms": timeout.as_millis() as u64,
            }),
        );

        match self.units.get_mut(&unit_id) {
            Some(slot) => {
                slot.state.begin(entry.task_id.clone(), now);
                slot.in_flight = Some(InFlight {
                    entry,
                    ticket,
                    timer,
                    started_at: now,
                });
                Ok(())
            }
            None => {
                timer.abort();
                Err(entry)
            }
        }
    }

    /// Route a message from a unit thread.
    pub(crate) fn on_unit_event(&mut self, event: UnitEvent) {
        match event {
            UnitEvent::Completed {
                unit_id,
                ticket,
                outcome,
                duration,
                transfers,
            } => self.on_unit_message(unit_id, ticket, outcome, duration, transfers),
            UnitEvent::Crashed {
                unit_id,
                ticket,
                reason,
            } => self.handle_unit_error(unit_id, ticket, reason),
            UnitEvent::Exited { unit_id } => self.handle_unit_exit(unit_id),
        }
    }

    /// A unit finished an attempt.
    fn on_unit_message(
        &mut self,
        unit_id: UnitId,
        ticket: u64,
        outcome: Result<Value, String>,
        duration: Duration,
        transfers: Vec<Vec<u8>>,
    ) {
        let Some(in_flight) = self.settle_unit(unit_id, ticket) else {
            self.reporter.debug(
                "Discarding stale reply",
                json!({ "unit_id": unit_id.to_string(), "ticket": ticket }),
            );
            if self.finish_draining(unit_id, ticket) {
                self.unit_released(unit_id);
            }
            return;
        };

        let mut entry = in_flight.entry;
        entry.task.transfers = transfers;

        if let Some(slot) = self.units.get_mut(&unit_id) {
            slot.state
                .record_completion(&entry.task.task_type, duration, Instant::now());
        }

        match outcome {
            Ok(value) => self.resolve(entry, unit_id, value, duration),
            Err(message) => {
                let error = TaskError::Execution {
                    task_id: entry.task_id.clone(),
                    attempts: entry.attempts,
                    message,
                };
                self.retry_or_reject(entry, error);
            }
        }

        self.unit_released(unit_id);
    }

    /// Detach the in-flight attempt matching `ticket` and mark the unit idle.
    ///
    /// Returns `None` for a stale ticket, leaving the unit untouched.
    pub(crate) fn settle_unit(&mut self, unit_id: UnitId, ticket: u64) -> Option<InFlight> {
        let slot = self.units.get_mut(&unit_id)?;
        if slot.in_flight.as_ref().map(|in_flight| in_flight.ticket) != Some(ticket) {
            return None;
        }

        let in_flight = slot.in_flight.take()?;
        in_flight.timer.abort();
        slot.state.release(Instant::now());
        Some(in_flight)
    }

    /// Clear a unit's draining mark once the timed-out attempt identified by
    /// `ticket` has come back.
    pub(crate) fn finish_draining(&mut self, unit_id: UnitId, ticket: u64) -> bool {
        let drained = self
            .units
            .get_mut(&unit_id)
            .map_or(false, |slot| slot.state.finish_draining(ticket));
        if drained {
            self.reporter.debug(
                "Execution unit drained",
                json!({ "unit_id": unit_id.to_string(), "ticket": ticket }),
            );
        }
        drained
    }

    fn resolve(&mut self, entry: QueuedEntry, unit_id: UnitId, value: Value, duration: Duration) {
        self.metrics.task_completed(duration);
        self.reporter.debug(
            "Task completed",
            json!({
                "task_id": entry.task_id.as_str(),
                "unit_id": unit_id.to_string(),
                "attempts": entry.attempts,
                "duration_ms": duration.as_secs_f64() * 1000.0,
            }),
        );

        let output = TaskOutput {
            task_id: entry.task_id.clone(),
            value,
            attempts: entry.attempts,
            unit_id,
            duration,
            transfers: entry.task.transfers,
        };

        if let Some(callback) = &entry.task.on_success {
            self.reporter
                .guard_callback("on_success", entry.task_id.as_str(), || callback(&output));
        }
        let _ = entry.reply.send(Ok(output));
    }

    /// Apply the retry policy to a failed attempt.
    pub(crate) fn retry_or_reject(&mut self, entry: QueuedEntry, error: TaskError) {
        let max_retries = entry.max_retries(&self.config);
        if !entry.can_retry(&self.config) {
            self.metrics.task_failed();
            self.reporter.error(
                "Task failed",
                json!({
                    "task_id": entry.task_id.as_str(),
                    "attempts": entry.attempts,
                    "error": error.to_string(),
                }),
            );
            self.reject(entry, error);
            return;
        }

        let delay = backoff_delay(
            self.config.retry_base_delay,
            self.config.retry_max_delay,
            entry.attempts,
        );
        self.metrics.task_retried();
        self.reporter.warn(
            "Retrying task",
            json!({
                "task_id": entry.task_id.as_str(),
                "attempts": entry.attempts,
                "max_retries": max_retries,
                "delay_ms": delay.as_millis() as u64,
                "error": error.to_string(),
            }),
        );

        if delay.is_zero() {
            self.schedule(entry);
        } else {
            self.park(entry, delay);
        }
    }

    fn park(&mut self, entry: QueuedEntry, delay: Duration) {
        let key = self.next_sequence();
        let timer = self.start_timer(delay, TimerEvent::RetryDue(key));
        self.parked.insert(key, (entry, timer));
    }

    /// Settle the caller's future with `error`.
    pub(crate) fn reject(&mut self, entry: QueuedEntry, error: TaskError) {
        if let Some(callback) = &entry.task.on_error {
            self.reporter
                .guard_callback("on_error", entry.task_id.as_str(), || callback(&error));
        }
        let _ = entry.reply.send(Err(error));
    }

    /// Reject with `PoolTerminated`.
    pub(crate) fn cancel(&mut self, entry: QueuedEntry) {
        self.metrics.task_cancelled();
        let error = TaskError::PoolTerminated {
            task_id: entry.task_id.clone(),
            attempts: entry.attempts,
        };
        self.reject(entry, error);
    }

    /// A unit went idle: retire it if a shrink asked for that, then hand out
    /// queued work.
    pub(crate) fn unit_released(&mut self, unit_id: UnitId) {
        let retiring = self
            .units
            .get(&unit_id)
            .map_or(false, |slot| slot.state.retiring && slot.in_flight.is_none());
        if retiring {
            self.terminate_unit(unit_id, "pool shrink");
        }
        self.drain_queue();
    }

    /// Dispatch queued tasks, highest priority first, until no unit is left.
    pub(crate) fn drain_queue(&mut self) {
        while let Some(entry) = self.queue.pop() {
            if let Err(entry) = self.dispatch(entry) {
                self.queue.push_front(entry);
                break;
            }
        }
    }
}
