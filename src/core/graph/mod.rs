//! Graph module for deadlock detection
//!
//! This module contains the graph model used by the detector:
//! - Graph snapshot: validated, immutable entities and relation edges
//! - Wait-for graph: the process wait relation projected out of a snapshot

pub mod snapshot;
pub mod wait_for_graph;

pub use snapshot::GraphSnapshot;
pub use wait_for_graph::{DetectionMode, WaitForGraph};
