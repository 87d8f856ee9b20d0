//! Error types of the detection engine
//!
//! Every failure carries enough context to tell transient conditions (a busy
//! simulator, an unreachable inventory) from programming errors (an edge
//! pointing nowhere, an empty log entry). A missing cycle is never an error.

use crate::core::types::{EdgeKind, EntityId};
use serde::Serialize;
use std::fmt;

/// Referential-integrity failures while building a graph snapshot
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("entity {0:?} appears more than once in the inventory")]
    DuplicateEntity(EntityId),
    #[error("invalid edge {from:?} {kind} {to:?}: {reason}")]
    InvalidEdge {
        from: EntityId,
        to: EntityId,
        kind: EdgeKind,
        reason: String,
    },
}

/// Failures of a monitoring snapshot provider
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("inventory unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read system state: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse system state: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures of the deadlock event log
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    #[error("invalid log entry: {0}")]
    InvalidLogEntry(&'static str),
    #[error("failed to persist log entry: {0}")]
    Persist(#[from] std::io::Error),
    #[error("failed to encode log entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures of a simulation run
#[derive(thiserror::Error, Debug)]
pub enum SimulationError {
    #[error("a simulation run is already in progress")]
    Busy,
    #[error(transparent)]
    InventoryUnavailable(#[from] ProviderError),
    #[error("not enough entities to inject a deadlock: need {required} processes, found {available}")]
    NotEnoughEntities { required: usize, available: usize },
    #[error(transparent)]
    InvalidGraph(#[from] GraphError),
    #[error(transparent)]
    EventLog(#[from] LogError),
    #[error("simulation run was abandoned")]
    Abandoned,
    #[error("simulation worker exited without reporting")]
    WorkerLost,
}

/// Coarse classification of a [`SimulationError`] for callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    SimulationBusy,
    InventoryUnavailable,
    InvalidEdge,
    InvalidLogEntry,
    /// The event store could not be written
    StoreUnavailable,
    Abandoned,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl SimulationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimulationError::Busy => ErrorKind::SimulationBusy,
            SimulationError::InventoryUnavailable(_) | SimulationError::NotEnoughEntities { .. } => {
                ErrorKind::InventoryUnavailable
            }
            SimulationError::InvalidGraph(_) => ErrorKind::InvalidEdge,
            SimulationError::EventLog(LogError::InvalidLogEntry(_)) => ErrorKind::InvalidLogEntry,
            SimulationError::EventLog(LogError::Persist(_)) => ErrorKind::StoreUnavailable,
            SimulationError::EventLog(LogError::Encode(_)) => ErrorKind::Internal,
            SimulationError::Abandoned => ErrorKind::Abandoned,
            SimulationError::WorkerLost => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SimulationBusy
                | ErrorKind::InventoryUnavailable
                | ErrorKind::StoreUnavailable
                | ErrorKind::Abandoned
        )
    }
}
