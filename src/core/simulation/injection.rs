//! Deadlock injection policies
//!
//! A policy looks at the un-injected snapshot and returns the edges to add so
//! that the augmented snapshot contains a circular wait. Policies only ever
//! add edges; the base snapshot is never changed.

use crate::core::error::SimulationError;
use crate::core::graph::GraphSnapshot;
use crate::core::types::{Edge, EntityId};

/// Chooses which edges force a deadlock into a snapshot
pub trait InjectionPolicy: Send + Sync {
    fn inject(&self, snapshot: &GraphSnapshot) -> Result<Vec<Edge>, SimulationError>;
}

/// Wires the first `size` processes into a ring
///
/// With at least `size` unheld resources, process `i` takes resource `i` and
/// waits for resource `i + 1` (mod `size`), the classic hold-and-wait ring.
/// Without enough free resources, process `i` waits for process `i + 1`
/// directly. Processes and resources are picked in inventory order, so the
/// same inventory always yields the same ring.
#[derive(Debug, Clone, Copy)]
pub struct RingInjection {
    size: usize,
}

impl Default for RingInjection {
    fn default() -> Self {
        RingInjection { size: 3 }
    }
}

impl RingInjection {
    pub fn new(size: usize) -> Self {
        RingInjection { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl InjectionPolicy for RingInjection {
    fn inject(&self, snapshot: &GraphSnapshot) -> Result<Vec<Edge>, SimulationError> {
        let processes: Vec<&EntityId> = snapshot.processes().map(|p| &p.id).take(self.size).collect();
        if processes.len() < self.size {
            return Err(SimulationError::NotEnoughEntities {
                required: self.size,
                available: processes.len(),
            });
        }

        let free: Vec<&EntityId> = snapshot
            .resources()
            .map(|r| &r.id)
            .filter(|id| snapshot.holder_of(id).is_none())
            .take(self.size)
            .collect();

        let n = self.size;
        let mut edges = Vec::with_capacity(2 * n);
        if free.len() == n {
            for (i, process) in processes.iter().enumerate() {
                edges.push(Edge::holds((*process).clone(), free[i].clone()));
            }
            for (i, process) in processes.iter().enumerate() {
                edges.push(Edge::waits_for((*process).clone(), free[(i + 1) % n].clone()));
            }
        } else {
            for (i, process) in processes.iter().enumerate() {
                edges.push(Edge::waits_for((*process).clone(), processes[(i + 1) % n].clone()));
            }
        }

        Ok(edges)
    }
}

/// Injects nothing; a run then only reports what is already there
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInjection;

impl InjectionPolicy for NoInjection {
    fn inject(&self, _snapshot: &GraphSnapshot) -> Result<Vec<Edge>, SimulationError> {
        Ok(Vec::new())
    }
}
