//! Monitoring snapshot providers
//!
//! A provider answers "what does the system look like right now". The engine
//! treats every call as a pure read that reflects some recent state; nothing
//! is assumed about ordering between two calls.

use crate::core::error::ProviderError;
use crate::core::types::{Edge, Entity};
use fxhash::FxHashSet;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Entities plus whatever relation the provider already observes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemState {
    pub entities: Vec<Entity>,
    pub edges: Vec<Edge>,
}

/// Source of the current process/resource inventory
pub trait SnapshotProvider: Send + Sync {
    /// Current processes (with telemetry) and resources
    fn current_entities(&self) -> Result<Vec<Entity>, ProviderError>;

    /// Holds/waits-for edges currently observed; none by default
    fn current_relation(&self) -> Result<Vec<Edge>, ProviderError> {
        Ok(Vec::new())
    }

    /// Entities and relation read together
    fn current_state(&self) -> Result<SystemState, ProviderError> {
        Ok(SystemState {
            entities: self.current_entities()?,
            edges: self.current_relation()?,
        })
    }
}

/// Fixed inventory held in memory, replaceable at runtime
#[derive(Debug, Default)]
pub struct StaticProvider {
    state: RwLock<SystemState>,
}

impl StaticProvider {
    pub fn new(entities: Vec<Entity>, edges: Vec<Edge>) -> Self {
        StaticProvider {
            state: RwLock::new(SystemState { entities, edges }),
        }
    }

    /// Swap in a new inventory; later reads observe it
    pub fn replace(&self, entities: Vec<Entity>, edges: Vec<Edge>) {
        *self.state.write() = SystemState { entities, edges };
    }
}

impl SnapshotProvider for StaticProvider {
    fn current_entities(&self) -> Result<Vec<Entity>, ProviderError> {
        Ok(self.state.read().entities.clone())
    }

    fn current_relation(&self) -> Result<Vec<Edge>, ProviderError> {
        Ok(self.state.read().edges.clone())
    }

    fn current_state(&self) -> Result<SystemState, ProviderError> {
        Ok(self.state.read().clone())
    }
}

const PROCESS_NAMES: &[&str] = &[
    "systemd", "sshd", "postgres", "nginx", "redis-server", "cron", "dockerd", "python3",
];
const FIRST_PID: u32 = 1000;

/// Seeded stand-in for a live process table
///
/// Ids and names are stable across calls; CPU and memory are redrawn on every
/// read so pollers see the telemetry move.
pub struct SyntheticProvider {
    processes: usize,
    resources: usize,
    rng: Mutex<StdRng>,
}

impl SyntheticProvider {
    pub fn new(processes: usize, resources: usize, seed: u64) -> Self {
        SyntheticProvider {
            processes,
            resources,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl SnapshotProvider for SyntheticProvider {
    fn current_entities(&self) -> Result<Vec<Entity>, ProviderError> {
        let mut rng = self.rng.lock();
        let mut entities = Vec::with_capacity(self.processes + self.resources);

        for i in 0..self.processes {
            let pid = FIRST_PID + i as u32;
            let name = PROCESS_NAMES[i % PROCESS_NAMES.len()];
            let cpu = (rng.random_range(0.0..100.0_f64) * 10.0).round() / 10.0;
            let memory = (rng.random_range(1.0..512.0_f64) * 10.0).round() / 10.0;
            entities.push(Entity::process(pid.to_string(), name).with_telemetry(cpu, memory));
        }
        entities.extend((1..=self.resources).map(|r| Entity::resource(format!("R{r}"))));

        Ok(entities)
    }
}

/// Per-process record of a `system_state.json` file
#[derive(Debug, Deserialize)]
struct ProcessRecord {
    process_name: String,
    #[serde(default)]
    allocated: Option<String>,
    #[serde(default)]
    waiting_for: Option<String>,
    #[serde(default)]
    cpu: Option<f64>,
    #[serde(default)]
    memory: Option<f64>,
}

/// Reads process/resource allocations from a system state file
///
/// The file maps a pid to `{process_name, allocated, waiting_for}`, where the
/// last two name resources. Processes come out in pid order, resources in
/// order of first mention. When several pids claim the same allocation, the
/// lowest pid holds it and the rest wait for it.
pub struct StateFileProvider {
    path: PathBuf,
}

impl StateFileProvider {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        StateFileProvider {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<SystemState, ProviderError> {
        let contents = std::fs::read_to_string(&self.path)?;
        let records: BTreeMap<String, ProcessRecord> = serde_json::from_str(&contents)?;

        let mut pids: Vec<&String> = records.keys().collect();
        pids.sort_by(|a, b| {
            (a.parse::<u64>().ok(), a.as_str()).cmp(&(b.parse::<u64>().ok(), b.as_str()))
        });

        let mut state = SystemState::default();
        let mut resources: Vec<String> = Vec::new();
        let mut holders: FxHashSet<&str> = FxHashSet::default();
        for pid in pids {
            let record = &records[pid];
            let mut process = Entity::process(pid.clone(), record.process_name.clone());
            if record.cpu.is_some() || record.memory.is_some() {
                process = process
                    .with_telemetry(record.cpu.unwrap_or_default(), record.memory.unwrap_or_default());
            }
            state.entities.push(process);

            // A resource claimed by several pids is held by the first one;
            // the others are queued on it
            if let Some(resource) = &record.allocated {
                if holders.insert(resource.as_str()) {
                    state.edges.push(Edge::holds(pid.clone(), resource.clone()));
                } else {
                    state.edges.push(Edge::waits_for(pid.clone(), resource.clone()));
                }
            }
            if let Some(resource) = &record.waiting_for {
                state.edges.push(Edge::waits_for(pid.clone(), resource.clone()));
            }
            for resource in [&record.allocated, &record.waiting_for].into_iter().flatten() {
                if !resources.contains(resource) {
                    resources.push(resource.clone());
                }
            }
        }
        state
            .entities
            .extend(resources.into_iter().map(Entity::resource));

        Ok(state)
    }
}

impl SnapshotProvider for StateFileProvider {
    fn current_entities(&self) -> Result<Vec<Entity>, ProviderError> {
        Ok(self.load()?.entities)
    }

    fn current_relation(&self) -> Result<Vec<Edge>, ProviderError> {
        Ok(self.load()?.edges)
    }

    fn current_state(&self) -> Result<SystemState, ProviderError> {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detector::CycleDetector;
    use crate::core::graph::GraphSnapshot;
    use crate::core::types::EntityKind;
    use tempfile::TempDir;

    #[test]
    fn test_static_provider_replace() {
        let provider = StaticProvider::new(vec![Entity::process("1", "a")], Vec::new());
        assert_eq!(provider.current_entities().unwrap().len(), 1);

        provider.replace(
            vec![Entity::process("1", "a"), Entity::resource("R1")],
            vec![Edge::holds("1", "R1")],
        );
        let state = provider.current_state().unwrap();
        assert_eq!(state.entities.len(), 2);
        assert_eq!(state.edges, vec![Edge::holds("1", "R1")]);
    }

    #[test]
    fn test_synthetic_provider_is_stable_and_seeded() {
        let provider = SyntheticProvider::new(5, 3, 7);
        let first = provider.current_entities().unwrap();
        let second = provider.current_entities().unwrap();

        assert_eq!(first.len(), 8);
        let ids = |v: &[Entity]| v.iter().map(|e| e.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first[0].id, "1000");
        assert_eq!(first[5].id, "R1");
        assert_eq!(first[5].kind, EntityKind::Resource);

        let telemetry = first[0].telemetry.unwrap();
        assert!((0.0..=100.0).contains(&telemetry.cpu));

        let replay = SyntheticProvider::new(5, 3, 7).current_entities().unwrap();
        assert_eq!(first, replay);
        assert!(provider.current_relation().unwrap().is_empty());
    }

    #[test]
    fn test_state_file_provider() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("system_state.json");
        std::fs::write(
            &path,
            r#"{
                "1200": {"process_name": "nginx", "allocated": "R2", "waiting_for": "R1"},
                "900": {"process_name": "sshd", "allocated": "R1", "waiting_for": "R2", "cpu": 1.5},
                "1000": {"process_name": "cron"}
            }"#,
        )
        .unwrap();

        let provider = StateFileProvider::new(&path);
        let state = provider.current_state().unwrap();

        let ids: Vec<&str> = state.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["900", "1000", "1200", "R1", "R2"]);
        assert!(state.entities[0].telemetry.is_some());
        assert!(state.entities[1].telemetry.is_none());
        assert_eq!(
            state.edges,
            vec![
                Edge::holds("900", "R1"),
                Edge::waits_for("900", "R2"),
                Edge::holds("1200", "R2"),
                Edge::waits_for("1200", "R1"),
            ]
        );
    }

    #[test]
    fn test_shared_allocation_queues_later_claimants() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("system_state.json");
        std::fs::write(
            &path,
            r#"{
                "1005": {"process_name": "nginx", "allocated": "R1", "waiting_for": "R2"},
                "1000": {"process_name": "systemd", "allocated": "R1"},
                "1001": {"process_name": "sshd", "allocated": "R2", "waiting_for": "R1"}
            }"#,
        )
        .unwrap();

        let state = StateFileProvider::new(&path).current_state().unwrap();
        assert_eq!(
            state.edges,
            vec![
                Edge::holds("1000", "R1"),
                Edge::holds("1001", "R2"),
                Edge::waits_for("1001", "R1"),
                Edge::waits_for("1005", "R1"),
                Edge::waits_for("1005", "R2"),
            ]
        );

        let snapshot = GraphSnapshot::new(state.entities, state.edges).unwrap();
        assert_eq!(snapshot.holder_of("R1").map(String::as_str), Some("1000"));
        assert_eq!(CycleDetector::default().find_cycle(&snapshot), None);
    }

    #[test]
    fn test_state_file_errors() {
        let temp_dir = TempDir::new().unwrap();

        let missing = StateFileProvider::new(temp_dir.path().join("absent.json"));
        assert!(matches!(missing.current_state(), Err(ProviderError::Io(_))));

        let path = temp_dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let broken = StateFileProvider::new(&path);
        assert!(matches!(broken.current_entities(), Err(ProviderError::Parse(_))));
    }
}
