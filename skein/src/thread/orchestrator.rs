//! # Orchestrator
//!
//! The control loop behind a `Pool`. A single tokio task owns every piece of
//! scheduling state: the unit table, the task queue, the retry parking lot
//! and the metrics. Everything else reaches it through messages:
//!
//! - [`Command`]s from `Pool` handles
//! - `UnitEvent`s from execution unit threads
//! - [`TimerEvent`]s from timeout and backoff timers
//!
//! Because each message is handled to completion before the next one is
//! received, completions and queue draining never interleave and no lock is
//! needed. The scheduling operations live in `scheduler`, unit management in
//! `lifecycle`; both are `impl Orchestrator` blocks.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use skein_api::{PoolConfig, PoolError, PoolStatus, TaskHandler, UnitId};

use crate::thread::metrics::MetricsCollector;
use crate::thread::reporter::Reporter;
use crate::thread::scheduler::entry::QueuedEntry;
use crate::thread::scheduler::queue::TaskQueue;
use crate::thread::unit::message::UnitEvent;
use crate::thread::unit::state::UnitState;
use crate::thread::unit::ExecutionUnit;

/// Requests from `Pool` handles.
pub(crate) enum Command {
    Submit(QueuedEntry),
    Resize {
        min_units: Option<usize>,
        max_units: Option<usize>,
        reply: oneshot::Sender<Result<(), PoolError>>,
    },
    /// Shut down; the sender is notified once every future has been settled.
    Terminate(oneshot::Sender<()>),
}

/// Deadlines posted back to the loop by timer tasks.
#[derive(Debug)]
pub(crate) enum TimerEvent {
    /// The dispatch identified by `ticket` ran past its timeout.
    TaskTimeout { unit_id: UnitId, ticket: u64 },
    /// A parked retry's backoff delay has elapsed.
    RetryDue(u64),
}

/// A dispatched attempt.
pub(crate) struct InFlight {
    pub entry: QueuedEntry,
    pub ticket: u64,
    pub timer: AbortHandle,
    pub started_at: Instant,
}

/// An execution unit and everything the orchestrator knows about it.
pub(crate) struct UnitSlot {
    pub unit: ExecutionUnit,
    pub state: UnitState,
    pub in_flight: Option<InFlight>,
}

pub(crate) struct Orchestrator {
    pub(crate) config: PoolConfig,
    pub(crate) handler: Arc<dyn TaskHandler>,
    pub(crate) reporter: Reporter,
    /// Ordered by id, so FIFO selection is the lowest id.
    pub(crate) units: BTreeMap<UnitId, UnitSlot>,
    pub(crate) queue: TaskQueue,
    /// Retries waiting out their backoff, keyed by park number.
    pub(crate) parked: HashMap<u64, (QueuedEntry, AbortHandle)>,
    pub(crate) metrics: MetricsCollector,
    pub(crate) unit_tx: UnboundedSender<UnitEvent>,
    pub(crate) timer_tx: UnboundedSender<TimerEvent>,
    status_tx: watch::Sender<PoolStatus>,
    next_unit_id: u64,
    next_sequence: u64,
    pub(crate) terminated: bool,
}

impl Orchestrator {
    pub fn new(
        config: PoolConfig,
        handler: Arc<dyn TaskHandler>,
        reporter: Reporter,
        unit_tx: UnboundedSender<UnitEvent>,
        timer_tx: UnboundedSender<TimerEvent>,
        status_tx: watch::Sender<PoolStatus>,
    ) -> Self {
        Self {
            config,
            handler,
            reporter,
            units: BTreeMap::new(),
            queue: TaskQueue::new(),
            parked: HashMap::new(),
            metrics: MetricsCollector::new(),
            unit_tx,
            timer_tx,
            status_tx,
            next_unit_id: 1,
            next_sequence: 0,
            terminated: false,
        }
    }

    /// Bring the pool up to `min_units` before the loop starts.
    pub fn start(&mut self) -> Result<(), PoolError> {
        while self.units.len() < self.config.min_units {
            self.create_unit()?;
        }
        self.reporter.info(
            "Pool started",
            json!({
                "min_units": self.config.min_units,
                "max_units": self.config.max_units,
                "smart_scheduling": self.config.enable_smart_scheduling,
                "preheating": self.config.enable_preheating,
            }),
        );
        self.publish_status();
        Ok(())
    }

    /// Run until terminated, or until every `Pool` handle is gone.
    pub async fn run(
        mut self,
        mut commands: UnboundedReceiver<Command>,
        mut unit_events: UnboundedReceiver<UnitEvent>,
        mut timers: UnboundedReceiver<TimerEvent>,
    ) {
        let mut reap = tokio::time::interval(self.config.reap_interval);
        reap.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Submit(entry)) => self.submit(entry),
                    Some(Command::Resize { min_units, max_units, reply }) => {
                        let result = self.resize(min_units, max_units);
                        self.publish_status();
                        let _ = reply.send(result);
                    }
                    Some(Command::Terminate(ack)) => {
                        self.terminate();
                        self.publish_status();
                        let _ = ack.send(());
                    }
                    None => {
                        debug!("all pool handles dropped");
                        self.terminate();
                    }
                },
                Some(event) = unit_events.recv() => self.on_unit_event(event),
                Some(event) = timers.recv() => self.on_timer(event),
                _ = reap.tick() => self.reap_idle_units(),
            }

            self.publish_status();
            if self.terminated {
                break;
            }
        }
    }

    fn on_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::TaskTimeout { unit_id, ticket } => self.handle_task_timeout(unit_id, ticket),
            TimerEvent::RetryDue(key) => {
                if let Some((entry, _)) = self.parked.remove(&key) {
                    self.schedule(entry);
                }
            }
        }
    }

    /// Next dispatch ticket or park number.
    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    pub(crate) fn next_unit_id(&mut self) -> UnitId {
        let id = UnitId::new(self.next_unit_id);
        self.next_unit_id += 1;
        id
    }

    /// Post `event` to the loop after `delay`.
    pub(crate) fn start_timer(&self, delay: Duration, event: TimerEvent) -> AbortHandle {
        let timers = self.timer_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = timers.send(event);
        })
        .abort_handle()
    }

    pub(crate) fn snapshot(&self) -> PoolStatus {
        let now = Instant::now();
        let busy_units = self.units.values().filter(|slot| slot.state.busy).count();

        PoolStatus {
            unit_count: self.units.len(),
            busy_units,
            idle_units: self.units.len() - busy_units,
            queue_size: self.queue.len(),
            parked_retries: self.parked.len(),
            min_units: self.config.min_units,
            max_units: self.config.max_units,
            terminated: self.terminated,
            metrics: self.metrics.snapshot(),
            units: self.units.values().map(|slot| slot.state.snapshot(now)).collect(),
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.snapshot());
    }
}

#[cfg(test)]
impl Orchestrator {
    /// Orchestrator driven by hand: the caller feeds unit events and timers.
    pub(crate) fn for_test<H: TaskHandler>(
        config: PoolConfig,
        handler: H,
    ) -> (Self, UnboundedReceiver<UnitEvent>, UnboundedReceiver<TimerEvent>) {
        let (unit_tx, unit_rx) = tokio::sync::mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = tokio::sync::mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(PoolStatus::default());
        let orchestrator = Self::new(
            config,
            Arc::new(handler),
            Reporter::default(),
            unit_tx,
            timer_tx,
            status_tx,
        );
        (orchestrator, unit_rx, timer_rx)
    }
}
