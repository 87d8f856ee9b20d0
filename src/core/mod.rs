// Core types
pub mod types;

pub mod error;

// Activity logging
pub mod logger;

// Graph model
pub mod graph;

// Cycle detector
pub mod detector;

pub mod dispatcher;
pub mod event_log;
pub mod provider;
pub mod simulation;
pub mod watch;

use crate::dashboard::Dashboard;
use anyhow::{Context, Result};
use dispatcher::{DeadlockCallback, Dispatcher};
use event_log::{EventLog, LogEntry};
use graph::DetectionMode;
use logger::ActivityLogger;
use provider::{SnapshotProvider, SyntheticProvider};
use simulation::{InjectionPolicy, RingInjection, SimulationConfig, Simulator, SimulatorOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Inventory used when no provider is configured
const DEFAULT_PROCESSES: usize = 8;
const DEFAULT_RESOURCES: usize = 5;
const DEFAULT_SEED: u64 = 42;

/// Wfgscope configuration struct
pub struct Wfgscope {
    log_path: Option<PathBuf>,
    store_path: Option<PathBuf>,
    provider: Option<Arc<dyn SnapshotProvider>>,
    injection: Arc<dyn InjectionPolicy>,
    config: SimulationConfig,
    callback: Option<DeadlockCallback>,
}

impl Default for Wfgscope {
    fn default() -> Self {
        Self::new()
    }
}

impl Wfgscope {
    /// Create a new Wfgscope with default settings
    ///
    /// By default:
    /// - Activity logging is disabled
    /// - The event log lives in memory only
    /// - The inventory comes from a seeded synthetic provider
    /// - Injection wires a ring of three processes
    /// - Phase delays are 2 s and 5 s and detection is composed
    pub fn new() -> Self {
        Wfgscope {
            log_path: None,
            store_path: None,
            provider: None,
            injection: Arc::new(RingInjection::default()),
            config: SimulationConfig::default(),
            callback: None,
        }
    }

    /// Activate the activity logger and set the path for its file
    ///
    /// # Arguments
    /// * `path` - Path to the log file. If the path contains "{timestamp}",
    ///   it will be replaced with the current timestamp.
    pub fn with_log<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Persist the deadlock event log to a JSON-lines file
    pub fn with_store<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn SnapshotProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn injection(mut self, policy: Arc<dyn InjectionPolicy>) -> Self {
        self.injection = policy;
        self
    }

    pub fn checking_delay(mut self, delay: Duration) -> Self {
        self.config.checking_delay = delay;
        self
    }

    pub fn injecting_delay(mut self, delay: Duration) -> Self {
        self.config.injecting_delay = delay;
        self
    }

    pub fn detection_mode(mut self, mode: DetectionMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set a callback to be invoked for every logged deadlock
    ///
    /// The callback runs on a background dispatcher thread.
    pub fn on_deadlock<F>(mut self, callback: F) -> Self
    where
        F: Fn(LogEntry) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Wire everything up and return the dashboard facade
    ///
    /// # Errors
    /// Returns an error if the activity log or the event store can't be opened
    pub fn start(self) -> Result<Dashboard> {
        let activity = match self.log_path {
            Some(path) => Some(Arc::new(
                ActivityLogger::with_file(path).context("Failed to initialize activity logger")?,
            )),
            None => None,
        };

        let log = match self.store_path {
            Some(path) => EventLog::with_file(&path)
                .with_context(|| format!("Failed to open event store {}", path.display()))?,
            None => EventLog::new(),
        };
        let log = Arc::new(log);

        let provider = self.provider.unwrap_or_else(|| {
            Arc::new(SyntheticProvider::new(
                DEFAULT_PROCESSES,
                DEFAULT_RESOURCES,
                DEFAULT_SEED,
            ))
        });

        let dispatcher = self.callback.map(|cb| Arc::new(Dispatcher::new(cb)));

        let simulator = Simulator::new(
            Arc::clone(&provider),
            Arc::clone(&log),
            SimulatorOptions {
                config: self.config,
                injection: self.injection,
                activity: activity.clone(),
                dispatcher: dispatcher.clone(),
            },
        );

        Ok(Dashboard::new(provider, simulator, log, activity, dispatcher))
    }
}
