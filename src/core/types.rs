use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity identifier type
///
/// Uniquely identifies a process or a resource inside one graph snapshot.
/// Process ids are usually PIDs rendered as strings, resource ids are
/// names such as `R1`.
pub type EntityId = String;

/// Identifier of one simulation run
pub type RunId = u64;

/// What an entity in the wait-for graph represents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Process,
    Resource,
}

/// Transient process telemetry supplied by the monitoring side
///
/// Carried for display only; detection never looks at it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Telemetry {
    /// CPU usage in percent
    pub cpu: f64,
    /// Resident memory in MiB
    pub memory: f64,
}

/// A process or a resource taking part in the wait-for relation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Telemetry>,
}

impl Entity {
    /// Create a process entity without telemetry
    pub fn process(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Entity {
            id: id.into(),
            name: name.into(),
            kind: EntityKind::Process,
            telemetry: None,
        }
    }

    /// Create a resource entity, named after its id
    pub fn resource(id: impl Into<EntityId>) -> Self {
        let id = id.into();
        Entity {
            name: id.clone(),
            id,
            kind: EntityKind::Resource,
            telemetry: None,
        }
    }

    /// Attach telemetry to the entity
    pub fn with_telemetry(mut self, cpu: f64, memory: f64) -> Self {
        self.telemetry = Some(Telemetry { cpu, memory });
        self
    }

    pub fn is_process(&self) -> bool {
        self.kind == EntityKind::Process
    }
}

/// Kind of relation between two entities
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// The source process currently holds the target resource
    Holds,
    /// The source process is blocked on the target (a resource or a process)
    WaitsFor,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Holds => f.write_str("holds"),
            EdgeKind::WaitsFor => f.write_str("waits-for"),
        }
    }
}

/// A directed relation edge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: EdgeKind,
}

impl Edge {
    /// `process` holds `resource`
    pub fn holds(process: impl Into<EntityId>, resource: impl Into<EntityId>) -> Self {
        Edge {
            source: process.into(),
            target: resource.into(),
            kind: EdgeKind::Holds,
        }
    }

    /// `process` waits for `target`
    pub fn waits_for(process: impl Into<EntityId>, target: impl Into<EntityId>) -> Self {
        Edge {
            source: process.into(),
            target: target.into(),
            kind: EdgeKind::WaitsFor,
        }
    }
}

/// A witness cycle proving a deadlock
///
/// The ids are stored without repeating the closing node: `[P1, P2, P3]`
/// stands for `P1 -> P2 -> P3 -> P1`. A self-loop is a single-element cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Cycle(Vec<EntityId>);

impl Cycle {
    pub(crate) fn new(nodes: Vec<EntityId>) -> Self {
        Cycle(nodes)
    }

    pub fn nodes(&self) -> &[EntityId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The closed walk, with the first node repeated at the end
    pub fn closed(&self) -> Vec<EntityId> {
        let mut walk = self.0.clone();
        if let Some(first) = self.0.first() {
            walk.push(first.clone());
        }
        walk
    }

    /// Consecutive pairs of the walk, including the closing pair
    pub fn pairs(&self) -> impl Iterator<Item = (&EntityId, &EntityId)> {
        let n = self.0.len();
        (0..n).map(move |i| (&self.0[i], &self.0[(i + 1) % n]))
    }

    /// Whether `other` is the same cycle, possibly starting at another node
    pub fn is_rotation_of(&self, other: &[EntityId]) -> bool {
        if self.0.len() != other.len() {
            return false;
        }
        if self.0.is_empty() {
            return true;
        }
        (0..other.len()).any(|shift| {
            self.0
                .iter()
                .enumerate()
                .all(|(i, id)| *id == other[(i + shift) % other.len()])
        })
    }

    pub fn into_inner(self) -> Vec<EntityId> {
        self.0
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.closed().join(" -> "))
    }
}

/// How a finished run ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Deadlock,
    Clear,
    Error,
}

/// Observable phase of the simulation state machine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", tag = "phase", content = "resolution")]
pub enum SimulationPhase {
    Idle,
    Checking,
    Injecting,
    Resolved(Resolution),
}

impl SimulationPhase {
    /// A run is in flight in this phase
    pub fn is_running(&self) -> bool {
        matches!(self, SimulationPhase::Checking | SimulationPhase::Injecting)
    }
}

impl fmt::Display for SimulationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationPhase::Idle => f.write_str("idle"),
            SimulationPhase::Checking => f.write_str("checking"),
            SimulationPhase::Injecting => f.write_str("injecting"),
            SimulationPhase::Resolved(Resolution::Deadlock) => f.write_str("resolved(deadlock)"),
            SimulationPhase::Resolved(Resolution::Clear) => f.write_str("resolved(clear)"),
            SimulationPhase::Resolved(Resolution::Error) => f.write_str("resolved(error)"),
        }
    }
}
