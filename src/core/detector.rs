//! Cycle detection over the wait-for relation
//!
//! # How it works
//!
//! Depth-first traversal from every unvisited node, in inventory order. Each
//! node is either unvisited, on the current path, or done (fully explored and
//! known not to reach a cycle). Successors are tried in edge order. Reaching a
//! node that is still on the path closes a cycle: the witness is the path
//! suffix starting at that node.
//!
//! The witness is therefore the *first* cycle met in that traversal order.
//! Other cycles may coexist; existence is what proves the deadlock, so they
//! are not enumerated. Done nodes are never re-entered, which bounds the walk
//! by the size of the graph. The traversal keeps an explicit stack so long
//! wait chains can't overflow the thread stack.

use crate::core::graph::{DetectionMode, GraphSnapshot, WaitForGraph};
use crate::core::types::Cycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// Finds one witness cycle in a snapshot's wait-for relation
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleDetector {
    mode: DetectionMode,
}

impl CycleDetector {
    pub fn new(mode: DetectionMode) -> Self {
        CycleDetector { mode }
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    /// Return the witness cycle of `snapshot`, or `None` if it is deadlock free
    ///
    /// Deterministic: the same snapshot always yields the same witness.
    pub fn find_cycle(&self, snapshot: &GraphSnapshot) -> Option<Cycle> {
        if !snapshot.has_waits_for() {
            return None;
        }
        let graph = WaitForGraph::project(snapshot, self.mode);
        find_first_cycle(&graph)
    }

    /// Check that every consecutive pair of `cycle`, including the closing
    /// pair, is an edge of the evaluated relation
    pub fn is_witness(&self, snapshot: &GraphSnapshot, cycle: &Cycle) -> bool {
        if cycle.is_empty() {
            return false;
        }
        let graph = WaitForGraph::project(snapshot, self.mode);
        cycle.pairs().all(|(from, to)| graph.has_edge(from, to))
    }
}

fn find_first_cycle(graph: &WaitForGraph<'_>) -> Option<Cycle> {
    let mut marks = vec![Mark::Unvisited; graph.snapshot().entities().len()];
    // Active path and, per frame, the index of the next successor to try
    let mut path: Vec<usize> = Vec::new();
    let mut cursor: Vec<usize> = Vec::new();

    for &root in graph.nodes() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::OnPath;
        path.push(root);
        cursor.push(0);

        while let Some(&node) = path.last() {
            let depth = path.len() - 1;
            let successors = graph.successors_of(node);

            let Some(&next) = successors.get(cursor[depth]) else {
                marks[node] = Mark::Done;
                path.pop();
                cursor.pop();
                continue;
            };
            cursor[depth] += 1;

            match marks[next] {
                Mark::OnPath => {
                    if let Some(start) = path.iter().position(|&p| p == next) {
                        let nodes = path[start..]
                            .iter()
                            .map(|&pos| graph.id_at(pos).clone())
                            .collect();
                        return Some(Cycle::new(nodes));
                    }
                }
                Mark::Unvisited => {
                    marks[next] = Mark::OnPath;
                    path.push(next);
                    cursor.push(0);
                }
                Mark::Done => {}
            }
        }
    }

    None
}
