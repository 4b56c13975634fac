use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::PoolError;

/// Configuration for a task pool.
///
/// Durations are (de)serialized as integer milliseconds, so the struct can be
/// embedded in a host application's own configuration file:
///
/// ```rust
/// use std::time::Duration;
/// use skein_api::PoolConfig;
///
/// let config: PoolConfig = serde_json::from_str(
///     r#"{ "min_units": 2, "max_units": 8, "task_timeout_ms": 1500 }"#,
/// ).unwrap();
/// assert_eq!(config.task_timeout, Duration::from_millis(1500));
/// assert!(config.enable_smart_scheduling);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Units kept alive even when idle.
    pub min_units: usize,

    /// Hard upper bound on live units.
    pub max_units: usize,

    /// Default per-task timeout.
    #[serde(rename = "task_timeout_ms", with = "duration_ms")]
    pub task_timeout: Duration,

    /// Idle time after which a unit above `min_units` is reaped.
    #[serde(rename = "idle_timeout_ms", with = "duration_ms")]
    pub idle_timeout: Duration,

    /// Default retry budget; a task runs at most `max_retries + 1` times.
    pub max_retries: u32,

    /// Score idle units by affinity, speed, load and error rate instead of
    /// picking the first idle unit.
    pub enable_smart_scheduling: bool,

    /// Warm up each new unit before it serves real tasks.
    pub enable_preheating: bool,

    /// A unit is replaced once its error count exceeds this value.
    pub unit_error_threshold: u32,

    /// How often idle units are checked for reaping.
    #[serde(rename = "reap_interval_ms", with = "duration_ms")]
    pub reap_interval: Duration,

    /// Delay before the first retry; doubled for each further retry.
    /// Zero retries immediately.
    #[serde(rename = "retry_base_delay_ms", with = "duration_ms")]
    pub retry_base_delay: Duration,

    /// Upper bound on the retry delay.
    #[serde(rename = "retry_max_delay_ms", with = "duration_ms")]
    pub retry_max_delay: Duration,

    /// Prefix for execution unit thread names.
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_units: 1,
            max_units: num_cpus::get().max(1),
            task_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            max_retries: 2,
            enable_smart_scheduling: true,
            enable_preheating: false,
            unit_error_threshold: 3,
            reap_interval: Duration::from_secs(10),
            retry_base_delay: Duration::ZERO,
            retry_max_delay: Duration::from_secs(5),
            thread_name_prefix: "skein-unit".to_string(),
        }
    }
}

impl PoolConfig {
    /// Check the bounds the pool relies on.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_units == 0 {
            return Err(PoolError::InvalidConfig("max_units must be at least 1".into()));
        }
        if self.min_units > self.max_units {
            return Err(PoolError::InvalidConfig(format!(
                "min_units ({}) exceeds max_units ({})",
                self.min_units, self.max_units
            )));
        }
        if self.task_timeout.is_zero() {
            return Err(PoolError::InvalidConfig("task_timeout must be non-zero".into()));
        }
        if self.reap_interval.is_zero() {
            return Err(PoolError::InvalidConfig("reap_interval must be non-zero".into()));
        }
        Ok(())
    }

    pub fn with_units(mut self, min_units: usize, max_units: usize) -> Self {
        self.min_units = min_units;
        self.max_units = max_units;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_smart_scheduling(mut self, enabled: bool) -> Self {
        self.enable_smart_scheduling = enabled;
        self
    }

    pub fn with_preheating(mut self, enabled: bool) -> Self {
        self.enable_preheating = enabled;
        self
    }

    pub fn with_unit_error_threshold(mut self, threshold: u32) -> Self {
        self.unit_error_threshold = threshold;
        self
    }

    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    pub fn with_retry_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.retry_base_delay = base_delay;
        self.retry_max_delay = max_delay;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
