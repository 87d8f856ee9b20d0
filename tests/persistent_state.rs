use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use wfgscope::{EventLog, NoInjection, StateFileProvider, WatchEvent, Wfgscope};
mod common;
use common::{RUN_TIMEOUT, is_rotation};

const DEADLOCKED_STATE: &str = r#"{
    "4012": {"process_name": "postgres", "allocated": "table_a", "waiting_for": "table_b", "cpu": 12.5, "memory": 310.0},
    "977": {"process_name": "backup", "allocated": "table_b", "waiting_for": "table_a"},
    "1200": {"process_name": "cron"}
}"#;

const CLEAR_STATE: &str = r#"{
    "4012": {"process_name": "postgres", "allocated": "table_a"},
    "977": {"process_name": "backup", "waiting_for": "table_a"}
}"#;

#[test]
fn test_state_file_deadlock_is_persisted_and_reloaded() {
    let dir = tempdir().unwrap();
    let state_path = dir.path().join("system_state.json");
    let store_path = dir.path().join("store").join("deadlocks.jsonl");
    std::fs::write(&state_path, DEADLOCKED_STATE).unwrap();

    {
        let dashboard = Wfgscope::new()
            .provider(Arc::new(StateFileProvider::new(&state_path)))
            .injection(Arc::new(NoInjection))
            .checking_delay(Duration::ZERO)
            .injecting_delay(Duration::ZERO)
            .with_store(&store_path)
            .start()
            .unwrap();

        let processes = dashboard.processes().unwrap();
        let pids: Vec<&str> = processes.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(pids, ["977", "1200", "4012"]);
        assert_eq!(processes[2].cpu, 12.5);

        let response = dashboard.simulate().unwrap();
        assert!(is_rotation(&response.cycle, &["977", "4012"]));
        assert_eq!(response.initial_state, "deadlock");
    }

    let reopened = EventLog::with_file(&store_path).unwrap();
    assert_eq!(reopened.len(), 1);
    let entry = reopened.latest().unwrap();
    assert_eq!(entry.cycle.nodes(), ["977".to_string(), "4012".to_string()]);
    assert_eq!(entry.edges.len(), 4);

    // A fresh dashboard on the same store sees the earlier entry
    let dashboard = Wfgscope::new()
        .provider(Arc::new(StateFileProvider::new(&state_path)))
        .with_store(&store_path)
        .start()
        .unwrap();
    assert_eq!(dashboard.logs(), vec![entry]);
}

#[test]
fn test_watch_logs_a_standing_deadlock_once() {
    let dir = tempdir().unwrap();
    let state_path = dir.path().join("system_state.json");
    std::fs::write(&state_path, DEADLOCKED_STATE).unwrap();

    let dashboard = Wfgscope::new()
        .provider(Arc::new(StateFileProvider::new(&state_path)))
        .start()
        .unwrap();

    let mut watcher = dashboard.watcher();
    let first = watcher.tick().unwrap();
    let second = watcher.tick().unwrap();
    assert!(first.logged);
    assert!(second.cycle.is_some());
    assert!(!second.logged);
    assert_eq!(dashboard.logs().len(), 1);

    // Once cleared, a recurring deadlock is a new event
    std::fs::write(&state_path, CLEAR_STATE).unwrap();
    let cleared = watcher.tick().unwrap();
    assert_eq!(cleared.cycle, None);

    std::fs::write(&state_path, DEADLOCKED_STATE).unwrap();
    assert!(watcher.tick().unwrap().logged);
    assert_eq!(dashboard.logs().len(), 2);
}

#[test]
fn test_background_watch_reports_missing_state_file() {
    let dir = tempdir().unwrap();
    let dashboard = Wfgscope::new()
        .provider(Arc::new(StateFileProvider::new(
            dir.path().join("missing.json"),
        )))
        .start()
        .unwrap();

    let handle = dashboard.watcher().spawn(Duration::from_millis(20));
    let event = handle.events().recv_timeout(RUN_TIMEOUT).unwrap();
    assert!(matches!(event, WatchEvent::Failed { tick: 1, .. }));
    handle.stop();

    assert!(dashboard.logs().is_empty());
}

#[test]
fn test_activity_log_records_each_phase() {
    let dir = tempdir().unwrap();
    let state_path = dir.path().join("system_state.json");
    let log_path = dir.path().join("activity.log");
    std::fs::write(&state_path, DEADLOCKED_STATE).unwrap();

    let dashboard = Wfgscope::new()
        .provider(Arc::new(StateFileProvider::new(&state_path)))
        .checking_delay(Duration::ZERO)
        .injecting_delay(Duration::ZERO)
        .with_log(&log_path)
        .start()
        .unwrap();

    dashboard.simulate().unwrap();
    dashboard.flush().unwrap();

    let contents = std::fs::read_to_string(&log_path).unwrap();
    let records: Vec<Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let activities: Vec<&str> = records
        .iter()
        .map(|r| r["activity"].as_str().unwrap())
        .collect();
    assert_eq!(activities, ["phase", "phase", "detected", "phase"]);

    assert!(records.iter().all(|r| r["timestamp"].as_f64().is_some()));
    assert_eq!(records[0]["phase"]["phase"], "checking");
    assert_eq!(records[3]["phase"]["resolution"], "deadlock");
}
