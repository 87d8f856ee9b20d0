use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};
use wfgscope::{
    Dashboard, Edge, Entity, InjectionPolicy, LogEntry, ProviderError, SimulationPhase,
    SnapshotProvider, StaticProvider, Wfgscope,
};

#[allow(dead_code)]
pub const RUN_TIMEOUT: Duration = Duration::from_secs(5);
#[allow(dead_code)]
pub const NO_DEADLOCK_TIMEOUT: Duration = Duration::from_millis(300);
#[allow(dead_code)]
pub const PHASE_DELAY: Duration = Duration::from_millis(150);

/// Provider whose process table can never be read
#[allow(dead_code)]
pub struct FailingProvider;

impl SnapshotProvider for FailingProvider {
    fn current_entities(&self) -> Result<Vec<Entity>, ProviderError> {
        Err(ProviderError::Unavailable("process table unreadable".into()))
    }
}

/// Processes `P1..Pn` followed by resources `R1..Rm`
#[allow(dead_code)]
pub fn inventory(processes: usize, resources: usize) -> Vec<Entity> {
    let mut entities: Vec<Entity> = (1..=processes)
        .map(|i| Entity::process(format!("P{i}"), format!("proc-{i}")).with_telemetry(1.0, 64.0))
        .collect();
    entities.extend((1..=resources).map(|i| Entity::resource(format!("R{i}"))));
    entities
}

#[allow(dead_code)]
pub fn static_provider(entities: Vec<Entity>, edges: Vec<Edge>) -> Arc<StaticProvider> {
    Arc::new(StaticProvider::new(entities, edges))
}

pub struct DashboardHarness {
    pub dashboard: Dashboard,
    pub rx: mpsc::Receiver<LogEntry>,
}

/// Dashboard with equal phase delays whose deadlock callback feeds `rx`
pub fn start_dashboard(
    provider: Arc<dyn SnapshotProvider>,
    injection: Option<Arc<dyn InjectionPolicy>>,
    delay: Duration,
) -> DashboardHarness {
    let (tx, rx) = mpsc::channel::<LogEntry>();

    let mut builder = Wfgscope::new()
        .provider(provider)
        .checking_delay(delay)
        .injecting_delay(delay)
        .on_deadlock(move |entry| {
            let _ = tx.send(entry);
        });
    if let Some(policy) = injection {
        builder = builder.injection(policy);
    }

    let dashboard = builder.start().expect("Failed to start dashboard");
    DashboardHarness { dashboard, rx }
}

#[allow(dead_code)]
pub fn expect_deadlock(h: &DashboardHarness, timeout: Duration) -> LogEntry {
    match h.rx.recv_timeout(timeout) {
        Ok(entry) => entry,
        Err(_) => panic!("No deadlock reported within {timeout:?}"),
    }
}

#[allow(dead_code)]
pub fn assert_no_deadlock(h: &DashboardHarness, timeout: Duration) {
    assert!(
        h.rx.recv_timeout(timeout).is_err(),
        "Unexpected deadlock reported"
    );
}

/// Poll until the simulator reaches `phase` or `timeout` passes
#[allow(dead_code)]
pub fn wait_for_phase(dashboard: &Dashboard, phase: SimulationPhase, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if dashboard.status().phase == phase {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Whether `cycle` is `expected` starting at some node
#[allow(dead_code)]
pub fn is_rotation(cycle: &[String], expected: &[&str]) -> bool {
    cycle.len() == expected.len()
        && (0..expected.len()).any(|shift| {
            cycle
                .iter()
                .enumerate()
                .all(|(i, id)| id == expected[(i + shift) % expected.len()])
        })
}
