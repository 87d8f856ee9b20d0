//! Simulation state machine
//!
//! One run walks `Idle -> Checking -> Injecting -> Resolved`:
//!
//! 1. *Checking*: read the inventory, build the un-injected snapshot and look
//!    for a cycle already present. Then hold for `checking_delay`.
//! 2. *Injecting*: unless a cycle already exists, let the injection policy
//!    add a circular wait on top of a copy of the snapshot. Then hold for
//!    `injecting_delay`.
//! 3. *Resolved*: detect on the evaluated snapshot. A cycle is appended to
//!    the event log before the phase becomes `Resolved(deadlock)`; no cycle
//!    gives `Resolved(clear)`; any failure gives `Resolved(error)` and leaves
//!    the log untouched.
//!
//! Each run executes on its own worker thread, and the delays are timers
//! raced against a cancellation channel. A run whose [`RunHandle`] is dropped
//! or cancelled mid-delay resets the machine to `Idle` and commits nothing.
//! Only one run may be in flight; a second request gets
//! [`SimulationError::Busy`]. `Resolved` is a resting phase: the next run
//! request starts over from it.

pub mod injection;

pub use injection::{InjectionPolicy, NoInjection, RingInjection};

use crate::core::detector::CycleDetector;
use crate::core::dispatcher::Dispatcher;
use crate::core::error::SimulationError;
use crate::core::event_log::{EventLog, LogEntry};
use crate::core::graph::{DetectionMode, GraphSnapshot};
use crate::core::logger::{Activity, ActivityLogger};
use crate::core::provider::SnapshotProvider;
use crate::core::types::{Cycle, Edge, Entity, Resolution, RunId, SimulationPhase};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, TryRecvError, after, bounded, select, unbounded};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Timing and detection settings of a simulator
#[derive(Debug, Clone, Copy)]
pub struct SimulationConfig {
    /// How long the un-injected state stays observable
    pub checking_delay: Duration,
    /// How long the injected state stays observable before detection
    pub injecting_delay: Duration,
    /// Relation the detector evaluates
    pub mode: DetectionMode,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            checking_delay: Duration::from_secs(2),
            injecting_delay: Duration::from_secs(5),
            mode: DetectionMode::Composed,
        }
    }
}

/// Everything besides the provider and the log a simulator can be given
pub struct SimulatorOptions {
    pub config: SimulationConfig,
    pub injection: Arc<dyn InjectionPolicy>,
    pub activity: Option<Arc<ActivityLogger>>,
    pub dispatcher: Option<Arc<Dispatcher>>,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        SimulatorOptions {
            config: SimulationConfig::default(),
            injection: Arc::new(RingInjection::default()),
            activity: None,
            dispatcher: None,
        }
    }
}

/// A phase transition, as seen by subscribers of a run
#[derive(Debug, Clone, Serialize)]
pub struct PhaseEvent {
    pub run_id: RunId,
    pub phase: SimulationPhase,
    /// RFC 3339 time of the transition
    pub timestamp: String,
}

/// Polling view of the machine
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SimulationStatus {
    pub phase: SimulationPhase,
    /// Current or most recent run
    pub run_id: Option<RunId>,
}

/// Result of a run that reached `Resolved(deadlock)` or `Resolved(clear)`
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub resolution: Resolution,
    /// Whether a cycle was already present before injection
    pub deadlocked_before_injection: bool,
    /// Whether the injection policy added edges
    pub injected: bool,
    /// Witness on the evaluated snapshot
    pub cycle: Option<Cycle>,
    /// Every edge of the evaluated snapshot
    pub edges: Vec<Edge>,
    /// Inventory read during `Checking`
    pub entities: Vec<Entity>,
    /// Position of the new event log entry, if one was written
    pub log_index: Option<usize>,
}

struct Shared {
    status: Mutex<SimulationStatus>,
    next_run: Mutex<RunId>,
    provider: Arc<dyn SnapshotProvider>,
    log: Arc<EventLog>,
    config: SimulationConfig,
    injection: Arc<dyn InjectionPolicy>,
    activity: Option<Arc<ActivityLogger>>,
    dispatcher: Option<Arc<Dispatcher>>,
}

/// Drives simulation runs against a provider and an event log
#[derive(Clone)]
pub struct Simulator {
    shared: Arc<Shared>,
}

impl Simulator {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        log: Arc<EventLog>,
        options: SimulatorOptions,
    ) -> Self {
        Simulator {
            shared: Arc::new(Shared {
                status: Mutex::new(SimulationStatus {
                    phase: SimulationPhase::Idle,
                    run_id: None,
                }),
                next_run: Mutex::new(0),
                provider,
                log,
                config: options.config,
                injection: options.injection,
                activity: options.activity,
                dispatcher: options.dispatcher,
            }),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.shared.config
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.shared.log
    }

    pub fn phase(&self) -> SimulationPhase {
        self.shared.status.lock().phase
    }

    pub fn status(&self) -> SimulationStatus {
        *self.shared.status.lock()
    }

    /// Start a run in the background
    ///
    /// The machine is already in `Checking` when this returns.
    ///
    /// # Errors
    /// - [`SimulationError::Busy`] if another run is in flight
    /// - [`SimulationError::WorkerLost`] if the worker thread can't be spawned
    pub fn start(&self) -> Result<RunHandle, SimulationError> {
        let run_id = {
            let mut status = self.shared.status.lock();
            if status.phase.is_running() {
                return Err(SimulationError::Busy);
            }
            let mut next = self.shared.next_run.lock();
            *next += 1;
            status.phase = SimulationPhase::Checking;
            status.run_id = Some(*next);
            *next
        };

        let (event_tx, event_rx) = unbounded();
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        self.shared
            .announce(run_id, SimulationPhase::Checking, &event_tx);

        let shared = Arc::clone(&self.shared);
        let worker = thread::Builder::new()
            .name(format!("wfgscope-run-{run_id}"))
            .spawn(move || shared.execute(run_id, &event_tx, &cancel_rx));

        match worker {
            Ok(worker) => Ok(RunHandle {
                run_id,
                events: event_rx,
                cancel: cancel_tx,
                worker,
            }),
            Err(e) => {
                eprintln!("Failed to spawn simulation worker: {e}");
                self.shared.status.lock().phase = SimulationPhase::Idle;
                Err(SimulationError::WorkerLost)
            }
        }
    }

    /// Run to completion on the calling thread's behalf
    pub fn run(&self) -> Result<RunOutcome, SimulationError> {
        self.start()?.wait()
    }
}

/// Caller's side of an in-flight run
///
/// Dropping the handle abandons the run.
pub struct RunHandle {
    run_id: RunId,
    events: Receiver<PhaseEvent>,
    cancel: Sender<()>,
    worker: JoinHandle<Result<RunOutcome, SimulationError>>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Phase transitions of this run; disconnects once the run is over
    pub fn events(&self) -> &Receiver<PhaseEvent> {
        &self.events
    }

    /// Block until the run resolves
    pub fn wait(self) -> Result<RunOutcome, SimulationError> {
        let RunHandle { worker, cancel, .. } = self;
        let result = worker.join().map_err(|_| SimulationError::WorkerLost);
        // Keep the cancel side connected until the worker is done
        drop(cancel);
        result?
    }

    /// Abandon the run and block until the machine is back to `Idle`
    ///
    /// A run already past its last delay completes normally instead.
    pub fn cancel(self) -> Result<RunOutcome, SimulationError> {
        let RunHandle { worker, cancel, .. } = self;
        let _ = cancel.try_send(());
        drop(cancel);
        worker.join().map_err(|_| SimulationError::WorkerLost)?
    }
}

/// Puts the machine back to `Idle` if a worker unwinds mid-run
struct IdleOnPanic<'a>(&'a Shared);

impl Drop for IdleOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.status.lock().phase = SimulationPhase::Idle;
        }
    }
}

impl Shared {
    fn execute(
        &self,
        run_id: RunId,
        events: &Sender<PhaseEvent>,
        cancel: &Receiver<()>,
    ) -> Result<RunOutcome, SimulationError> {
        let _guard = IdleOnPanic(self);
        let result = self.drive(run_id, events, cancel);

        match &result {
            Ok(outcome) => {
                self.transition(run_id, SimulationPhase::Resolved(outcome.resolution), events);
            }
            Err(SimulationError::Abandoned) => {
                self.record(Activity::Abandoned { run_id });
                self.transition(run_id, SimulationPhase::Idle, events);
            }
            Err(e) => {
                self.record(Activity::Failed {
                    run_id: Some(run_id),
                    error: e.to_string(),
                });
                self.transition(run_id, SimulationPhase::Resolved(Resolution::Error), events);
            }
        }

        result
    }

    fn drive(
        &self,
        run_id: RunId,
        events: &Sender<PhaseEvent>,
        cancel: &Receiver<()>,
    ) -> Result<RunOutcome, SimulationError> {
        let detector = CycleDetector::new(self.config.mode);

        // Checking
        let state = self.provider.current_state()?;
        let baseline = GraphSnapshot::new(state.entities, state.edges)?;
        let deadlocked_before_injection = detector.find_cycle(&baseline).is_some();
        self.hold(self.config.checking_delay, cancel)?;

        // Injecting
        self.transition(run_id, SimulationPhase::Injecting, events);
        let augmented;
        let evaluated = if deadlocked_before_injection {
            &baseline
        } else {
            let extra = self.injection.inject(&baseline)?;
            augmented = baseline.with_edges(extra)?;
            &augmented
        };
        let added = evaluated.edges().len() - baseline.edges().len();
        if added > 0 {
            self.record(Activity::Injected {
                run_id,
                edges: added,
            });
        }
        self.hold(self.config.injecting_delay, cancel)?;

        // Resolved
        let cycle = detector.find_cycle(evaluated);
        let log_index = match &cycle {
            Some(cycle) => {
                let entry = LogEntry::new(cycle.clone(), evaluated.edges().to_vec());
                let index = self.log.append(entry.clone())?;
                self.record(Activity::Detected {
                    run_id: Some(run_id),
                    cycle: cycle.clone(),
                });
                if let Some(dispatcher) = &self.dispatcher {
                    dispatcher.send(entry);
                }
                Some(index)
            }
            None => None,
        };

        Ok(RunOutcome {
            run_id,
            resolution: if cycle.is_some() {
                Resolution::Deadlock
            } else {
                Resolution::Clear
            },
            deadlocked_before_injection,
            injected: added > 0,
            cycle,
            edges: evaluated.edges().to_vec(),
            entities: baseline.entities().to_vec(),
            log_index,
        })
    }

    /// Wait out a phase delay unless the run is abandoned first
    fn hold(&self, delay: Duration, cancel: &Receiver<()>) -> Result<(), SimulationError> {
        if delay.is_zero() {
            return match cancel.try_recv() {
                Err(TryRecvError::Empty) => Ok(()),
                _ => Err(SimulationError::Abandoned),
            };
        }
        select! {
            recv(cancel) -> _ => Err(SimulationError::Abandoned),
            recv(after(delay)) -> _ => Ok(()),
        }
    }

    fn transition(&self, run_id: RunId, phase: SimulationPhase, events: &Sender<PhaseEvent>) {
        self.status.lock().phase = phase;
        self.announce(run_id, phase, events);
    }

    fn announce(&self, run_id: RunId, phase: SimulationPhase, events: &Sender<PhaseEvent>) {
        self.record(Activity::Phase { run_id, phase });
        // Nobody listening is fine
        let _ = events.send(PhaseEvent {
            run_id,
            phase,
            timestamp: Utc::now().to_rfc3339(),
        });
    }

    fn record(&self, activity: Activity) {
        if let Some(logger) = &self.activity {
            logger.record(activity);
        }
    }
}
