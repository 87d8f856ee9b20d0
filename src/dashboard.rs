//! Dashboard-facing request/response contract
//!
//! Transport agnostic: each method corresponds to one dashboard request and
//! returns a serializable body or an [`ErrorBody`].
//!
//! | request          | method                  |
//! |------------------|-------------------------|
//! | `GET /processes` | [`Dashboard::processes`] |
//! | `POST /simulate` | [`Dashboard::simulate`]  |
//! | `GET /logs`      | [`Dashboard::logs`]      |
//! | `GET /status`    | [`Dashboard::status`]    |

use crate::core::dispatcher::Dispatcher;
use crate::core::error::{ErrorKind, ProviderError, SimulationError};
use crate::core::event_log::{EventLog, LogEntry};
use crate::core::logger::ActivityLogger;
use crate::core::provider::SnapshotProvider;
use crate::core::simulation::{RunOutcome, SimulationStatus, Simulator};
use crate::core::types::{Edge, EdgeKind, Entity, EntityId, Resolution};
use crate::core::watch::Watcher;
use fxhash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;

/// One row of the process table
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProcessView {
    pub id: EntityId,
    pub name: String,
    pub cpu: f64,
    pub memory: f64,
}

/// An edge annotated with entity names for rendering
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EdgeView {
    pub source: EntityId,
    pub source_name: String,
    pub target: EntityId,
    pub target_name: String,
    pub kind: EdgeKind,
}

/// Body of a finished simulation
#[derive(Debug, Clone, Serialize)]
pub struct SimulateResponse {
    pub run_id: u64,
    /// `"deadlock"` if a cycle existed before injection, else `"no_deadlock"`
    pub initial_state: &'static str,
    pub resolution: Resolution,
    /// Witness cycle; empty when clear
    pub cycle: Vec<EntityId>,
    pub edges: Vec<EdgeView>,
    pub processes: Vec<ProcessView>,
}

impl SimulateResponse {
    pub fn from_outcome(outcome: RunOutcome) -> Self {
        SimulateResponse {
            run_id: outcome.run_id,
            initial_state: if outcome.deadlocked_before_injection {
                "deadlock"
            } else {
                "no_deadlock"
            },
            resolution: outcome.resolution,
            cycle: outcome.cycle.map(|c| c.into_inner()).unwrap_or_default(),
            edges: annotate(&outcome.edges, &outcome.entities),
            processes: process_views(&outcome.entities),
        }
    }
}

/// Error response body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
    /// The same request may succeed later
    pub retryable: bool,
}

impl ErrorBody {
    /// Conventional HTTP status for this error
    pub fn status_code(&self) -> u16 {
        match self.kind {
            ErrorKind::SimulationBusy => 429,
            ErrorKind::InventoryUnavailable | ErrorKind::StoreUnavailable => 503,
            ErrorKind::Abandoned => 499,
            ErrorKind::InvalidEdge | ErrorKind::InvalidLogEntry | ErrorKind::Internal => 500,
        }
    }
}

impl From<SimulationError> for ErrorBody {
    fn from(err: SimulationError) -> Self {
        ErrorBody {
            error: err.to_string(),
            kind: err.kind(),
            retryable: err.is_transient(),
        }
    }
}

impl From<ProviderError> for ErrorBody {
    fn from(err: ProviderError) -> Self {
        SimulationError::from(err).into()
    }
}

fn process_views(entities: &[Entity]) -> Vec<ProcessView> {
    entities
        .iter()
        .filter(|e| e.is_process())
        .map(|e| {
            let telemetry = e.telemetry.unwrap_or_default();
            ProcessView {
                id: e.id.clone(),
                name: e.name.clone(),
                cpu: telemetry.cpu,
                memory: telemetry.memory,
            }
        })
        .collect()
}

fn annotate(edges: &[Edge], entities: &[Entity]) -> Vec<EdgeView> {
    let names: FxHashMap<&str, &str> = entities
        .iter()
        .map(|e| (e.id.as_str(), e.name.as_str()))
        .collect();
    let name_of = |id: &EntityId| names.get(id.as_str()).copied().unwrap_or(id).to_string();

    edges
        .iter()
        .map(|edge| EdgeView {
            source: edge.source.clone(),
            source_name: name_of(&edge.source),
            target: edge.target.clone(),
            target_name: name_of(&edge.target),
            kind: edge.kind,
        })
        .collect()
}

/// Facade a dashboard client talks to
pub struct Dashboard {
    provider: Arc<dyn SnapshotProvider>,
    simulator: Simulator,
    log: Arc<EventLog>,
    activity: Option<Arc<ActivityLogger>>,
    dispatcher: Option<Arc<Dispatcher>>,
}

impl Dashboard {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        simulator: Simulator,
        log: Arc<EventLog>,
        activity: Option<Arc<ActivityLogger>>,
        dispatcher: Option<Arc<Dispatcher>>,
    ) -> Self {
        Dashboard {
            provider,
            simulator,
            log,
            activity,
            dispatcher,
        }
    }

    /// `GET /processes`
    pub fn processes(&self) -> Result<Vec<ProcessView>, ErrorBody> {
        let entities = self.provider.current_entities()?;
        Ok(process_views(&entities))
    }

    /// `POST /simulate`, answered once the run resolves
    pub fn simulate(&self) -> Result<SimulateResponse, ErrorBody> {
        let outcome = self.simulator.run()?;
        Ok(SimulateResponse::from_outcome(outcome))
    }

    /// `GET /logs`, in append order
    pub fn logs(&self) -> Vec<LogEntry> {
        self.log.list()
    }

    /// `GET /status`
    pub fn status(&self) -> SimulationStatus {
        self.simulator.status()
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.log
    }

    /// A watcher sharing this dashboard's provider, log and callbacks
    pub fn watcher(&self) -> Watcher {
        Watcher::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.log),
            self.simulator.config().mode,
        )
        .with_activity_logger(self.activity.clone())
        .with_dispatcher(self.dispatcher.clone())
    }

    /// Flush the activity log, if any
    pub fn flush(&self) -> anyhow::Result<()> {
        match &self.activity {
            Some(logger) => logger.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_annotation() {
        let entities = vec![Entity::process("1200", "nginx"), Entity::resource("R1")];
        let views = annotate(
            &[Edge::holds("1200", "R1"), Edge::waits_for("1200", "ghost")],
            &entities,
        );
        assert_eq!(views[0].source_name, "nginx");
        assert_eq!(views[0].target_name, "R1");
        // Unknown ids fall back to the id itself
        assert_eq!(views[1].target_name, "ghost");
    }

    #[test]
    fn test_process_views_skip_resources() {
        let entities = vec![
            Entity::process("1", "init").with_telemetry(2.5, 12.0),
            Entity::process("2", "idle"),
            Entity::resource("R1"),
        ];
        let views = process_views(&entities);
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].cpu, 2.5);
        assert_eq!(views[1].memory, 0.0);
    }

    #[test]
    fn test_error_body_mapping() {
        let busy = ErrorBody::from(SimulationError::Busy);
        assert_eq!(busy.status_code(), 429);
        assert!(busy.retryable);

        let down = ErrorBody::from(ProviderError::Unavailable("no procfs".into()));
        assert_eq!(down.kind, ErrorKind::InventoryUnavailable);
        assert_eq!(down.status_code(), 503);
        assert!(down.error.contains("no procfs"));

        let disk = ErrorBody::from(SimulationError::from(
            crate::core::error::LogError::from(std::io::Error::other("read-only filesystem")),
        ));
        assert_eq!(disk.kind, ErrorKind::StoreUnavailable);
        assert_eq!(disk.status_code(), 503);
        assert!(disk.retryable);
    }
}
