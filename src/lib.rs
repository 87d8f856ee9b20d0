//! # Wfgscope
//!
//! Deadlock detection over a wait-for graph, with a simulation driver and a
//! deadlock event log for monitoring dashboards.
//!
//! Wfgscope takes an abstract inventory of processes and resources plus the
//! holds/waits-for relation between them, and proves a deadlock by finding a
//! cycle in the process wait relation.
//!
//! ## Features
//!
//! - Immutable, validated graph snapshots
//! - Deterministic witness-cycle detection
//! - Timed simulation runs that inject a circular wait and observe it
//! - Append-only deadlock event log, optionally persisted
//! - Periodic watching of a live relation
//! - Compact log export for the web viewer

mod core;
pub use core::{
    Wfgscope,
    detector::CycleDetector,
    dispatcher::{DeadlockCallback, Dispatcher},
    error::{ErrorKind, GraphError, LogError, ProviderError, SimulationError},
    event_log::{EventLog, LogEntry},
    graph::{DetectionMode, GraphSnapshot, WaitForGraph},
    logger::{Activity, ActivityLogger, current_log_file},
    provider::{SnapshotProvider, StateFileProvider, StaticProvider, SyntheticProvider, SystemState},
    simulation::{
        InjectionPolicy, NoInjection, PhaseEvent, RingInjection, RunHandle, RunOutcome,
        SimulationConfig, SimulationStatus, Simulator, SimulatorOptions,
    },
    types::{
        Cycle, Edge, EdgeKind, Entity, EntityId, EntityKind, Resolution, RunId, SimulationPhase,
        Telemetry,
    },
    watch::{WatchEvent, WatchHandle, WatchReport, Watcher},
};

pub mod dashboard;
pub use dashboard::Dashboard;

pub mod showcase;

pub const BANNER: &str = r#"
  ▖  ▖▄▖▄▖
  ▌▞▖▌▙▖▌ ▛▘▛▘▛▌▛▌█▌
  ▛ ▝▌▌ ▙▌▄▌▙▖▙▌▙▌▙▖
                ▌
"#;
