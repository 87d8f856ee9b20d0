//! Wait-for relation projected out of a graph snapshot
//!
//! Detection never walks raw holds/waits-for edges. It walks one of two
//! projections:
//! 1. *Composed*: process -> process. A process waiting on a resource waits
//!    for that resource's holder; a process waiting on a process waits for it
//!    directly. A wait on an unheld resource contributes nothing.
//! 2. *Direct*: the waits-for edges as given, over every entity.
//!
//! Node order is inventory order and successor order is edge order, which is
//! what makes the detector's witness deterministic.

use crate::core::graph::GraphSnapshot;
use crate::core::types::{EntityId, EntityKind};
use serde::{Deserialize, Serialize};

/// Which relation the detector evaluates
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Waits-for composed through resource holders into process -> process
    #[default]
    Composed,
    /// Waits-for edges only, no composition
    Direct,
}

/// Index-based adjacency over a snapshot's entities
pub struct WaitForGraph<'a> {
    snapshot: &'a GraphSnapshot,
    /// Traversal roots, as entity positions in inventory order
    nodes: Vec<usize>,
    /// Entity position -> successor positions in edge order
    adjacency: Vec<Vec<usize>>,
}

impl<'a> WaitForGraph<'a> {
    /// Project `snapshot` according to `mode`
    pub fn project(snapshot: &'a GraphSnapshot, mode: DetectionMode) -> Self {
        let entities = snapshot.entities();
        let mut adjacency = vec![Vec::new(); entities.len()];
        let mut nodes = Vec::with_capacity(entities.len());

        for (pos, entity) in entities.iter().enumerate() {
            if mode == DetectionMode::Composed && entity.kind != EntityKind::Process {
                continue;
            }
            nodes.push(pos);

            let successors = &mut adjacency[pos];
            for target in snapshot.outgoing_waits_for(&entity.id) {
                let next = match mode {
                    DetectionMode::Direct => snapshot.position(target),
                    DetectionMode::Composed => match snapshot.entity(target).map(|e| e.kind) {
                        Some(EntityKind::Process) => snapshot.position(target),
                        Some(EntityKind::Resource) => snapshot
                            .holder_of(target)
                            .and_then(|holder| snapshot.position(holder)),
                        None => None,
                    },
                };
                if let Some(next) = next
                    && !successors.contains(&next)
                {
                    successors.push(next);
                }
            }
        }

        WaitForGraph {
            snapshot,
            nodes,
            adjacency,
        }
    }

    pub fn snapshot(&self) -> &'a GraphSnapshot {
        self.snapshot
    }

    /// Traversal roots in inventory order
    pub(crate) fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub(crate) fn successors_of(&self, pos: usize) -> &[usize] {
        &self.adjacency[pos]
    }

    pub(crate) fn id_at(&self, pos: usize) -> &'a EntityId {
        &self.snapshot.entities()[pos].id
    }

    /// Whether `from` waits for `to` in this projection
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.snapshot.position(from), self.snapshot.position(to)) {
            (Some(a), Some(b)) => self.adjacency[a].contains(&b),
            _ => false,
        }
    }

    /// All projected edges as `(waiter, awaited)` pairs
    pub fn edges(&self) -> Vec<(EntityId, EntityId)> {
        self.nodes
            .iter()
            .flat_map(|&from| {
                self.adjacency[from]
                    .iter()
                    .map(move |&to| (self.id_at(from).clone(), self.id_at(to).clone()))
            })
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }
}
