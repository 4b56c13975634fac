//! Execution unit lifecycle: creation, reaping, fault handling and resizing.
//!
//! Faults come in two strengths. A crash (panicking handler, lost thread)
//! and a timeout both add one to the unit's error count and send the
//! in-flight task back through the retry policy. A timeout is a soft reset:
//! the unit is marked idle again even though its thread may still be busy,
//! and the stale reply is discarded by ticket when it arrives. Either way the
//! unit is only replaced once its error count exceeds
//! `unit_error_threshold`.

use std::time::Instant;

use serde_json::json;

use skein_api::{PoolError, TaskError, UnitId};

use crate::thread::orchestrator::{InFlight, Orchestrator, UnitSlot};
use crate::thread::unit::state::UnitState;
use crate::thread::unit::ExecutionUnit;

impl Orchestrator {
    /// Spawn a unit, refusing at `max_units`.
    pub(crate) fn create_unit(&mut self) -> Result<UnitId, PoolError> {
        if self.units.len() >= self.config.max_units {
            return Err(PoolError::Capacity {
                max_units: self.config.max_units,
            });
        }

        let unit_id = self.next_unit_id();
        let unit = ExecutionUnit::spawn(
            unit_id,
            &self.config.thread_name_prefix,
            self.handler.clone(),
            self.unit_tx.clone(),
        )?;

        if self.config.enable_preheating {
            if let Err(err) = unit.preheat() {
                self.reporter.warn(
                    "Preheat request failed",
                    json!({ "unit_id": unit_id.to_string(), "error": err.to_string() }),
                );
            }
        }

        self.units.insert(
            unit_id,
            UnitSlot {
                unit,
                state: UnitState::new(unit_id, Instant::now()),
                in_flight: None,
            },
        );
        self.metrics.unit_created(self.units.len());
        self.reporter.info(
            "Execution unit created",
            json!({ "unit_id": unit_id.to_string(), "units": self.units.len() }),
        );
        Ok(unit_id)
    }

    /// Remove a unit and stop its thread.
    ///
    /// Returns the attempt that was in flight, if any; its timer is already
    /// cancelled.
    pub(crate) fn terminate_unit(&mut self, unit_id: UnitId, reason: &str) -> Option<InFlight> {
        let slot = self.units.remove(&unit_id)?;
        slot.unit.stop();
        self.metrics.unit_terminated();
        self.reporter.info(
            "Execution unit terminated",
            json!({
                "unit_id": unit_id.to_string(),
                "reason": reason,
                "tasks_completed": slot.state.tasks_completed,
                "units": self.units.len(),
            }),
        );

        slot.in_flight.map(|in_flight| {
            in_flight.timer.abort();
            in_flight
        })
    }

    /// Terminate a unit that crossed the error threshold and spawn a fresh one.
    fn replace_unit(&mut self, unit_id: UnitId) -> Option<InFlight> {
        let error_count = self.units.get(&unit_id).map(|slot| slot.state.error_count);
        self.reporter.warn(
            "Replacing execution unit",
            json!({
                "unit_id": unit_id.to_string(),
                "error_count": error_count,
                "threshold": self.config.unit_error_threshold,
            }),
        );

        let in_flight = self.terminate_unit(unit_id, "error threshold exceeded");
        self.metrics.unit_replaced();
        if let Err(err) = self.create_unit() {
            self.reporter.error(
                "Could not create replacement unit",
                json!({ "error": err.to_string() }),
            );
        }
        in_flight
    }

    /// Create units until `min_units` is met.
    pub(crate) fn ensure_min_units(&mut self) {
        while self.units.len() < self.config.min_units {
            if let Err(err) = self.create_unit() {
                self.reporter.error(
                    "Could not maintain minimum pool size",
                    json!({ "error": err.to_string(), "units": self.units.len() }),
                );
                break;
            }
        }
    }

    /// Add one to a unit's error count and replace it past the threshold.
    fn count_unit_error(&mut self, unit_id: UnitId) {
        let Some(slot) = self.units.get_mut(&unit_id) else {
            return;
        };
        slot.state.record_error();
        if slot.state.error_count > self.config.unit_error_threshold {
            // Set only when the error came from an earlier, already-settled
            // attempt and a newer one had been dispatched since
            if let Some(in_flight) = self.replace_unit(unit_id) {
                let entry = in_flight.entry;
                let error = TaskError::UnitCrash {
                    task_id: entry.task_id.clone(),
                    attempts: entry.attempts,
                    unit_id,
                    reason: "execution unit replaced".to_string(),
                };
                self.retry_or_reject(entry, error);
            }
        }
    }

    /// Terminate units idle past `idle_timeout`, longest-idle first, while the
    /// pool is above `min_units`.
    pub(crate) fn reap_idle_units(&mut self) {
        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout;

        let mut candidates: Vec<(UnitId, std::time::Duration)> = self
            .units
            .values()
            .filter(|slot| slot.in_flight.is_none())
            .map(|slot| (slot.state.id, slot.state.idle_for(now)))
            .filter(|(_, idle_for)| *idle_for > idle_timeout)
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        for (unit_id, _) in candidates {
            if self.units.len() <= self.config.min_units {
                break;
            }
            self.terminate_unit(unit_id, "idle timeout");
        }

        self.ensure_min_units();
        self.drain_queue();
    }

    /// A unit crashed. `ticket` identifies the attempt that was running, if
    /// the crash happened inside a task rather than the warm-up hook.
    pub(crate) fn handle_unit_error(&mut self, unit_id: UnitId, ticket: Option<u64>, reason: String) {
        self.metrics.unit_crashed();
        self.reporter.error(
            "Execution unit crashed",
            json!({ "unit_id": unit_id.to_string(), "reason": reason }),
        );

        let detached = ticket.and_then(|ticket| self.settle_unit(unit_id, ticket));
        // A timed-out attempt was already counted when its timer fired
        let drained = ticket.map_or(false, |ticket| self.finish_draining(unit_id, ticket));
        if !drained {
            self.count_unit_error(unit_id);
        }

        if let Some(in_flight) = detached {
            let entry = in_flight.entry;
            let error = TaskError::UnitCrash {
                task_id: entry.task_id.clone(),
                attempts: entry.attempts,
                unit_id,
                reason,
            };
            self.retry_or_reject(entry, error);
        }

        self.unit_released(unit_id);
    }

    /// A unit thread left its loop.
    ///
    /// Units are removed from the table before they are told to stop, so an
    /// exit for a unit still in the table means its thread died on its own.
    pub(crate) fn handle_unit_exit(&mut self, unit_id: UnitId) {
        if !self.units.contains_key(&unit_id) {
            return;
        }

        self.metrics.unit_crashed();
        self.reporter.error(
            "Execution unit exited unexpectedly",
            json!({ "unit_id": unit_id.to_string() }),
        );

        if let Some(in_flight) = self.terminate_unit(unit_id, "thread exited") {
            let entry = in_flight.entry;
            let error = TaskError::UnitCrash {
                task_id: entry.task_id.clone(),
                attempts: entry.attempts,
                unit_id,
                reason: "execution unit thread exited".to_string(),
            };
            self.retry_or_reject(entry, error);
        }

        self.ensure_min_units();
        self.drain_queue();
    }

    /// The dispatch identified by `ticket` ran out of time.
    pub(crate) fn handle_task_timeout(&mut self, unit_id: UnitId, ticket: u64) {
        let Some(in_flight) = self.settle_unit(unit_id, ticket) else {
            return;
        };
        if let Some(slot) = self.units.get_mut(&unit_id) {
            slot.state.draining = Some(ticket);
        }

        self.metrics.task_timed_out();
        let entry = in_flight.entry;
        let timeout = entry.timeout(&self.config);
        self.reporter.warn(
            "Task timed out",
            json!({
                "task_id": entry.task_id.as_str(),
                "unit_id": unit_id.to_string(),
                "attempts": entry.attempts,
                "timeout_ms": timeout.as_millis() as u64,
                "elapsed_ms": in_flight.started_at.elapsed().as_millis() as u64,
            }),
        );

        self.count_unit_error(unit_id);

        let error = TaskError::Timeout {
            task_id: entry.task_id.clone(),
            attempts: entry.attempts,
            timeout,
        };
        self.retry_or_reject(entry, error);
        self.unit_released(unit_id);
    }

    /// Change the pool bounds.
    ///
    /// Growing creates units up to the new minimum. Shrinking terminates idle
    /// units first; busy units over the new maximum are marked retiring and
    /// terminated when their current task settles.
    pub(crate) fn resize(
        &mut self,
        min_units: Option<usize>,
        max_units: Option<usize>,
    ) -> Result<(), PoolError> {
        let mut config = self.config.clone();
        if let Some(min_units) = min_units {
            config.min_units = min_units;
        }
        if let Some(max_units) = max_units {
            config.max_units = max_units;
        }
        config.validate()?;
        self.config = config;

        for slot in self.units.values_mut() {
            slot.state.retiring = false;
        }

        let mut excess = self.units.len().saturating_sub(self.config.max_units);
        if excess > 0 {
            let idle: Vec<UnitId> = self
                .units
                .values()
                .rev()
                .filter(|slot| slot.in_flight.is_none())
                .map(|slot| slot.state.id)
                .take(excess)
                .collect();
            for unit_id in idle {
                self.terminate_unit(unit_id, "pool shrink");
                excess -= 1;
            }

            for slot in self.units.values_mut().rev().take(excess) {
                slot.state.retiring = true;
            }
        }

        self.ensure_min_units();
        self.drain_queue();

        self.reporter.info(
            "Pool resized",
            json!({
                "min_units": self.config.min_units,
                "max_units": self.config.max_units,
                "units": self.units.len(),
                "retiring": excess,
            }),
        );
        Ok(())
    }

    /// Reject every queued, parked and in-flight task and stop every unit.
    pub(crate) fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        let queued: Vec<_> = self.queue.drain().collect();
        let parked: Vec<_> = self.parked.drain().map(|(_, parked)| parked).collect();
        let unit_ids: Vec<UnitId> = self.units.keys().copied().collect();

        let mut cancelled = 0usize;
        for entry in queued {
            self.cancel(entry);
            cancelled += 1;
        }
        for (entry, timer) in parked {
            timer.abort();
            self.cancel(entry);
            cancelled += 1;
        }
        for unit_id in unit_ids {
            if let Some(in_flight) = self.terminate_unit(unit_id, "pool terminated") {
                self.cancel(in_flight.entry);
                cancelled += 1;
            }
        }

        self.reporter.info("Pool terminated", json!({ "cancelled_tasks": cancelled }));
    }
}
