#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use skein::{HandlerRegistry, Logger, Pool, PoolConfig, PoolStatus};

/// Default wait for status conditions during tests
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Small, deterministic pool: no units up front, FIFO selection, short reap
/// interval and a generous timeout.
pub fn test_config(max_units: usize) -> PoolConfig {
    PoolConfig::default()
        .with_units(0, max_units)
        .with_task_timeout(Duration::from_secs(5))
        .with_smart_scheduling(false)
        .with_reap_interval(Duration::from_millis(50))
}

/// Poll the pool until `predicate` holds, panicking after [`WAIT_LIMIT`].
pub async fn wait_until<F>(pool: &Pool, predicate: F) -> PoolStatus
where
    F: Fn(&PoolStatus) -> bool,
{
    let started = Instant::now();
    loop {
        let status = pool.status();
        if predicate(&status) {
            return status;
        }
        if started.elapsed() > WAIT_LIMIT {
            panic!("condition not reached in time; last status: {:#?}", status);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Task ids in the order the "record" handler ran them.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn push(&self, id: &str) {
        self.0.lock().unwrap().push(id.to_string());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Handlers shared by the integration tests.
///
/// - `echo`: returns the payload
/// - `block`: waits for a token on `gate`, then returns the payload
/// - `record`: appends the task id to `recorder`
/// - `sleep`: sleeps for `payload` milliseconds
/// - `sleep_first`: sleeps for `payload` milliseconds on the first attempt only
/// - `fail`: always fails with "boom"
/// - `flaky`: fails while `attempt <= payload`
/// - `panic`: always panics
/// - `panic_first`: panics on the first attempt only
pub fn handlers(gate: flume::Receiver<()>, recorder: Recorder) -> HandlerRegistry {
    HandlerRegistry::new()
        .register("echo", |input| Ok(input.payload))
        .register("block", move |input| {
            gate.recv_timeout(Duration::from_secs(10))
                .map_err(|err| format!("gate never opened: {}", err))?;
            Ok(input.payload)
        })
        .register("record", move |input| {
            recorder.push(input.task_id.as_str());
            Ok(json!(input.attempt))
        })
        .register("sleep", |input| {
            std::thread::sleep(Duration::from_millis(input.payload.as_u64().unwrap_or(0)));
            Ok(json!("slept"))
        })
        .register("sleep_first", |input| {
            if input.attempt == 1 {
                std::thread::sleep(Duration::from_millis(input.payload.as_u64().unwrap_or(0)));
            }
            Ok(json!(input.attempt))
        })
        .register("fail", |_| Err("boom".to_string()))
        .register("flaky", |input| {
            let failures = input.payload.as_u64().unwrap_or(0) as u32;
            if input.attempt <= failures {
                Err(format!("attempt {} failed", input.attempt))
            } else {
                Ok(json!(input.attempt))
            }
        })
        .register("panic", |_| panic!("unit exploded"))
        .register("panic_first", |input| {
            if input.attempt == 1 {
                panic!("first attempt exploded");
            }
            Ok(json!(input.attempt))
        })
}

/// A pool over [`handlers`] plus the sender that opens the gate.
pub fn pool_with_gate(config: PoolConfig) -> (Pool, flume::Sender<()>, Recorder) {
    pool_with_logger(config, None)
}

pub fn pool_with_logger(
    config: PoolConfig,
    logger: Option<Arc<dyn Logger>>,
) -> (Pool, flume::Sender<()>, Recorder) {
    let (open, gate) = flume::unbounded();
    let recorder = Recorder::default();
    let pool = Pool::new(config, logger, handlers(gate, recorder.clone())).expect("pool");
    (pool, open, recorder)
}

/// Logger that keeps every line it receives.
#[derive(Default)]
pub struct RecordingLogger {
    pub lines: Mutex<Vec<(String, String, Option<Value>)>>,
}

impl RecordingLogger {
    fn record(&self, level: &str, message: &str, data: Option<&Value>) {
        self.lines
            .lock()
            .unwrap()
            .push((level.to_string(), message.to_string(), data.cloned()));
    }

    pub fn messages(&self, level: &str) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _, _)| l == level)
            .map(|(_, message, _)| message.clone())
            .collect()
    }

    pub fn find(&self, message: &str) -> Option<Option<Value>> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .find(|(_, m, _)| m == message)
            .map(|(_, _, data)| data.clone())
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, message: &str, data: Option<&Value>) {
        self.record("debug", message, data);
    }

    fn info(&self, message: &str, data: Option<&Value>) {
        self.record("info", message, data);
    }

    fn warn(&self, message: &str, data: Option<&Value>) {
        self.record("warn", message, data);
    }

    fn error(&self, message: &str, data: Option<&Value>) {
        self.record("error", message, data);
    }
}
