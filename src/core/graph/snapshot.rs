//! Immutable graph snapshot of processes, resources and their relations
//!
//! A snapshot is validated once at construction and never mutated afterwards.
//! A different scenario is a different snapshot ([`GraphSnapshot::with_edges`]),
//! so a detection run over a snapshot is reproducible and has no side effects.

use crate::core::error::GraphError;
use crate::core::types::{Edge, EdgeKind, Entity, EntityId, EntityKind};
use fxhash::{FxHashMap, FxHashSet};

/// The system state at one instant
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    /// Entities in inventory order
    entities: Vec<Entity>,
    /// Entity id -> position in `entities`
    index: FxHashMap<EntityId, usize>,
    /// Deduplicated edges in first-seen order
    edges: Vec<Edge>,
    /// Source -> waits-for targets, in edge order
    waits_for: FxHashMap<EntityId, Vec<EntityId>>,
    /// Resource -> the process holding it
    holders: FxHashMap<EntityId, EntityId>,
}

impl GraphSnapshot {
    /// Build a snapshot from an entity set and an edge set
    ///
    /// Redundant edges (same source, target and kind) are collapsed to their
    /// first occurrence. Holds and waits-for between the same pair are kept
    /// as distinct facts.
    ///
    /// # Errors
    /// - [`GraphError::DuplicateEntity`] if two entities share an id
    /// - [`GraphError::InvalidEdge`] if an edge references an unknown entity,
    ///   connects entities of the wrong kinds, or hands a resource to a second
    ///   holder
    pub fn new(
        entities: impl IntoIterator<Item = Entity>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> Result<Self, GraphError> {
        let entities: Vec<Entity> = entities.into_iter().collect();
        let mut index = FxHashMap::default();
        for (pos, entity) in entities.iter().enumerate() {
            if index.insert(entity.id.clone(), pos).is_some() {
                return Err(GraphError::DuplicateEntity(entity.id.clone()));
            }
        }

        let mut snapshot = GraphSnapshot {
            entities,
            index,
            edges: Vec::new(),
            waits_for: FxHashMap::default(),
            holders: FxHashMap::default(),
        };

        let mut seen = FxHashSet::default();
        for edge in edges {
            if seen.contains(&edge) {
                continue;
            }
            snapshot.validate(&edge)?;
            match edge.kind {
                EdgeKind::Holds => {
                    snapshot
                        .holders
                        .insert(edge.target.clone(), edge.source.clone());
                }
                EdgeKind::WaitsFor => {
                    snapshot
                        .waits_for
                        .entry(edge.source.clone())
                        .or_default()
                        .push(edge.target.clone());
                }
            }
            seen.insert(edge.clone());
            snapshot.edges.push(edge);
        }

        Ok(snapshot)
    }

    /// A snapshot with no relations at all
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Result<Self, GraphError> {
        Self::new(entities, std::iter::empty())
    }

    fn validate(&self, edge: &Edge) -> Result<(), GraphError> {
        let invalid = |reason: String| GraphError::InvalidEdge {
            from: edge.source.clone(),
            to: edge.target.clone(),
            kind: edge.kind,
            reason,
        };

        let source = self
            .entity(&edge.source)
            .ok_or_else(|| invalid("unknown source entity".into()))?;
        let target = self
            .entity(&edge.target)
            .ok_or_else(|| invalid("unknown target entity".into()))?;

        if source.kind != EntityKind::Process {
            return Err(invalid("source must be a process".into()));
        }

        if edge.kind == EdgeKind::Holds {
            if target.kind != EntityKind::Resource {
                return Err(invalid("only resources can be held".into()));
            }
            if let Some(holder) = self.holders.get(&edge.target)
                && *holder != edge.source
            {
                return Err(invalid(format!("resource already held by {holder:?}")));
            }
        }

        Ok(())
    }

    /// A new snapshot with the same entities and `extra` edges appended
    pub fn with_edges(&self, extra: impl IntoIterator<Item = Edge>) -> Result<Self, GraphError> {
        Self::new(
            self.entities.iter().cloned(),
            self.edges.iter().cloned().chain(extra),
        )
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.index.get(id).map(|&pos| &self.entities[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Position of an entity in inventory order
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Process entities in inventory order
    pub fn processes(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.kind == EntityKind::Process)
    }

    /// Resource entities in inventory order
    pub fn resources(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.kind == EntityKind::Resource)
    }

    /// Direct waits-for targets of `id`, in edge order
    pub fn outgoing_waits_for(&self, id: &str) -> &[EntityId] {
        self.waits_for.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The process currently holding `resource_id`, if any
    pub fn holder_of(&self, resource_id: &str) -> Option<&EntityId> {
        self.holders.get(resource_id)
    }

    pub fn has_waits_for(&self) -> bool {
        !self.waits_for.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
