use std::time::Duration;

use skein_api::PoolMetrics;

/// Pool-wide counters, updated only on the orchestrator loop.
#[derive(Debug, Default)]
pub(crate) struct MetricsCollector {
    metrics: PoolMetrics,
    successful_time_ms: f64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_submitted(&mut self) {
        self.metrics.tasks_submitted += 1;
    }

    pub fn task_completed(&mut self, duration: Duration) {
        self.metrics.tasks_completed += 1;
        self.successful_time_ms += duration.as_secs_f64() * 1000.0;
        self.metrics.average_task_time_ms =
            self.successful_time_ms / self.metrics.tasks_completed as f64;
    }

    pub fn task_failed(&mut self) {
        self.metrics.tasks_failed += 1;
    }

    pub fn task_cancelled(&mut self) {
        self.metrics.tasks_cancelled += 1;
    }

    pub fn task_retried(&mut self) {
        self.metrics.tasks_retried += 1;
    }

    pub fn task_timed_out(&mut self) {
        self.metrics.tasks_timed_out += 1;
    }

    pub fn unit_crashed(&mut self) {
        self.metrics.unit_crashes += 1;
    }

    /// Count a new unit; `live` includes it.
    pub fn unit_created(&mut self, live: usize) {
        self.metrics.units_created += 1;
        self.metrics.peak_units = self.metrics.peak_units.max(live);
    }

    pub fn unit_terminated(&mut self) {
        self.metrics.units_terminated += 1;
    }

    pub fn unit_replaced(&mut self) {
        self.metrics.units_replaced += 1;
    }

    pub fn observe_queue(&mut self, len: usize) {
        self.metrics.peak_queue_size = self.metrics.peak_queue_size.max(len);
    }

    pub fn snapshot(&self) -> PoolMetrics {
        self.metrics.clone()
    }
}
