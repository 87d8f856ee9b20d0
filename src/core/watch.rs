//! Periodic deadlock detection over a provider's live relation
//!
//! Each tick reads the provider, builds a fresh snapshot and runs the
//! detector. A detected cycle is appended to the event log unless it is the
//! same witness the previous tick already logged, so a deadlock that simply
//! persists is recorded once.

use crate::core::detector::CycleDetector;
use crate::core::dispatcher::Dispatcher;
use crate::core::error::SimulationError;
use crate::core::event_log::{EventLog, LogEntry};
use crate::core::graph::{DetectionMode, GraphSnapshot};
use crate::core::logger::{Activity, ActivityLogger};
use crate::core::provider::SnapshotProvider;
use crate::core::types::Cycle;
use crossbeam_channel::{Receiver, Sender, bounded, select, tick, unbounded};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Result of one watch tick
#[derive(Debug, Clone, Serialize)]
pub struct WatchReport {
    pub tick: u64,
    pub cycle: Option<Cycle>,
    /// Whether this tick appended to the event log
    pub logged: bool,
}

/// What a background watcher reports per tick
#[derive(Debug)]
pub enum WatchEvent {
    Report(WatchReport),
    Failed { tick: u64, error: SimulationError },
}

pub struct Watcher {
    provider: Arc<dyn SnapshotProvider>,
    log: Arc<EventLog>,
    detector: CycleDetector,
    activity: Option<Arc<ActivityLogger>>,
    dispatcher: Option<Arc<Dispatcher>>,
    last: Option<Cycle>,
    ticks: u64,
}

impl Watcher {
    pub fn new(provider: Arc<dyn SnapshotProvider>, log: Arc<EventLog>, mode: DetectionMode) -> Self {
        Watcher {
            provider,
            log,
            detector: CycleDetector::new(mode),
            activity: None,
            dispatcher: None,
            last: None,
            ticks: 0,
        }
    }

    pub fn with_activity_logger(mut self, logger: Option<Arc<ActivityLogger>>) -> Self {
        self.activity = logger;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Option<Arc<Dispatcher>>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Run one detection pass
    ///
    /// # Errors
    /// Provider, graph and log failures are returned; the next tick starts
    /// fresh.
    pub fn tick(&mut self) -> Result<WatchReport, SimulationError> {
        self.ticks += 1;
        let tick = self.ticks;

        let result = self.detect(tick);
        if let Err(e) = &result {
            self.record(Activity::Failed {
                run_id: None,
                error: e.to_string(),
            });
        }
        result
    }

    fn detect(&mut self, tick: u64) -> Result<WatchReport, SimulationError> {
        let state = self.provider.current_state()?;
        let snapshot = GraphSnapshot::new(state.entities, state.edges)?;
        let cycle = self.detector.find_cycle(&snapshot);

        let logged = match &cycle {
            Some(cycle) if self.last.as_ref() != Some(cycle) => {
                let entry = LogEntry::new(cycle.clone(), snapshot.edges().to_vec());
                self.log.append(entry.clone())?;
                self.record(Activity::Detected {
                    run_id: None,
                    cycle: cycle.clone(),
                });
                if let Some(dispatcher) = &self.dispatcher {
                    dispatcher.send(entry);
                }
                true
            }
            _ => false,
        };
        self.last = cycle.clone();

        self.record(Activity::WatchTick {
            tick,
            deadlock: cycle.is_some(),
        });
        Ok(WatchReport {
            tick,
            cycle,
            logged,
        })
    }

    fn record(&self, activity: Activity) {
        if let Some(logger) = &self.activity {
            logger.record(activity);
        }
    }

    /// Tick immediately, then every `interval`, on a background thread
    pub fn spawn(mut self, interval: Duration) -> WatchHandle {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (event_tx, event_rx) = unbounded::<WatchEvent>();

        let thread = thread::spawn(move || {
            let ticker = tick(interval);
            loop {
                self.publish(&event_tx);
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {}
                }
            }
        });

        WatchHandle {
            stop: stop_tx,
            events: event_rx,
            thread,
        }
    }

    fn publish(&mut self, events: &Sender<WatchEvent>) {
        let event = match self.tick() {
            Ok(report) => WatchEvent::Report(report),
            Err(error) => WatchEvent::Failed {
                tick: self.ticks,
                error,
            },
        };
        let _ = events.send(event);
    }
}

/// Handle on a background watcher
pub struct WatchHandle {
    stop: Sender<()>,
    events: Receiver<WatchEvent>,
    thread: JoinHandle<()>,
}

impl WatchHandle {
    pub fn events(&self) -> &Receiver<WatchEvent> {
        &self.events
    }

    /// Stop ticking and wait for the watcher thread to exit
    pub fn stop(self) {
        let _ = self.stop.try_send(());
        if self.thread.join().is_err() {
            eprintln!("Watcher thread panicked");
        }
    }
}
