//! Append-only record of confirmed deadlocks
//!
//! Appends are serialized behind a write lock; readers take a read lock and
//! copy out whole entries, so a reader sees some prefix of the log and never a
//! half-built entry. When a store file is attached, an entry is written to disk
//! before it becomes visible in memory: a failed write publishes nothing.
//!
//! The store format is one JSON object per line, in append order.

use crate::core::error::LogError;
use crate::core::types::{Cycle, Edge};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One confirmed deadlock
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// RFC 3339 timestamp of the detection
    pub timestamp: String,
    /// Witness cycle, without the repeated closing node
    pub cycle: Cycle,
    /// Every edge of the snapshot the cycle was found in
    pub edges: Vec<Edge>,
}

impl LogEntry {
    /// Stamp a detection with the current time
    pub fn new(cycle: Cycle, edges: Vec<Edge>) -> Self {
        LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            cycle,
            edges,
        }
    }

    pub fn validate(&self) -> Result<(), LogError> {
        if self.cycle.is_empty() {
            return Err(LogError::InvalidLogEntry("cycle is empty"));
        }
        if self.edges.is_empty() {
            return Err(LogError::InvalidLogEntry("edge set is empty"));
        }
        Ok(())
    }
}

/// Deadlock event log shared by simulation runs, watchers and readers
pub struct EventLog {
    entries: RwLock<Vec<LogEntry>>,
    store: Option<Mutex<File>>,
    path: Option<PathBuf>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    /// Create an in-memory log
    pub fn new() -> Self {
        EventLog {
            entries: RwLock::new(Vec::new()),
            store: None,
            path: None,
        }
    }

    /// Open a log backed by a JSON-lines file
    ///
    /// Entries already in the file are loaded in order. Lines that don't
    /// parse are skipped with a warning. A missing file starts an empty log.
    ///
    /// # Errors
    /// Returns an error if the parent directory can't be created or the file
    /// can't be read or opened for appending.
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && parent.to_string_lossy() != ""
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (lineno, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogEntry>(&line) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => eprintln!(
                        "Warning: skipping unreadable log line {} in {}: {e}",
                        lineno + 1,
                        path.display()
                    ),
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(EventLog {
            entries: RwLock::new(entries),
            store: Some(Mutex::new(file)),
            path: Some(path),
        })
    }

    /// Append a validated entry and return its position
    ///
    /// # Errors
    /// - [`LogError::InvalidLogEntry`] if the cycle or the edge set is empty
    /// - [`LogError::Persist`] / [`LogError::Encode`] if the store write fails;
    ///   the entry is then not added
    pub fn append(&self, entry: LogEntry) -> Result<usize, LogError> {
        entry.validate()?;

        let mut entries = self.entries.write();
        if let Some(store) = &self.store {
            let json = serde_json::to_string(&entry)?;
            let mut file = store.lock();
            writeln!(file, "{json}")?;
            file.flush()?;
        }
        entries.push(entry);
        Ok(entries.len() - 1)
    }

    /// All entries in append order
    pub fn list(&self) -> Vec<LogEntry> {
        self.entries.read().clone()
    }

    /// All entries, most recent first
    ///
    /// The store itself is untouched; this is only a reversed copy.
    pub fn list_recent_first(&self) -> Vec<LogEntry> {
        let mut entries = self.list();
        entries.reverse();
        entries
    }

    pub fn latest(&self) -> Option<LogEntry> {
        self.entries.read().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn entry(ids: &[&str]) -> LogEntry {
        let cycle = Cycle::new(ids.iter().map(|s| s.to_string()).collect());
        let edges = cycle
            .pairs()
            .map(|(a, b)| Edge::waits_for(a.clone(), b.clone()))
            .collect();
        LogEntry::new(cycle, edges)
    }

    #[test]
    fn test_insertion_order() {
        let log = EventLog::new();
        assert_eq!(log.append(entry(&["P1", "P2"])).unwrap(), 0);
        assert_eq!(log.append(entry(&["P3"])).unwrap(), 1);

        let listed = log.list();
        assert_eq!(listed[0].cycle.nodes(), ["P1", "P2"]);
        assert_eq!(listed[1].cycle.nodes(), ["P3"]);

        let recent = log.list_recent_first();
        assert_eq!(recent[0].cycle.nodes(), ["P3"]);
        // Reversing a copy leaves the store in append order
        assert_eq!(log.list()[0].cycle.nodes(), ["P1", "P2"]);
        assert_eq!(log.latest().unwrap().cycle.nodes(), ["P3"]);
    }

    #[test]
    fn test_rejects_invalid_entries() {
        let log = EventLog::new();

        let empty_cycle = LogEntry::new(Cycle::new(Vec::new()), vec![Edge::waits_for("A", "B")]);
        assert!(matches!(
            log.append(empty_cycle),
            Err(LogError::InvalidLogEntry(_))
        ));

        let no_edges = LogEntry::new(Cycle::new(vec!["A".into()]), Vec::new());
        assert!(matches!(log.append(no_edges), Err(LogError::InvalidLogEntry(_))));

        assert!(log.is_empty());
    }

    #[test]
    fn test_persistence_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("deadlocks.jsonl");

        {
            let log = EventLog::with_file(&path).unwrap();
            log.append(entry(&["P1", "P2", "P3"])).unwrap();
            log.append(entry(&["P9"])).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.lines().next().unwrap().contains(r#""cycle":["P1","P2","P3"]"#));

        let reopened = EventLog::with_file(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.list()[1].cycle.nodes(), ["P9"]);
        assert_eq!(reopened.path(), Some(path.as_path()));

        reopened.append(entry(&["P4", "P5"])).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("deadlocks.jsonl");

        let good = serde_json::to_string(&entry(&["P1", "P2"])).unwrap();
        std::fs::write(&path, format!("{good}\nnot json\n\n{good}\n")).unwrap();

        let log = EventLog::with_file(&path).unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_concurrent_appenders_and_readers() {
        let log = Arc::new(EventLog::new());
        let mut handles = Vec::new();

        for t in 0..4 {
            let log = Arc::clone(&log);
            handles.push(thread::spawn(move || {
                for i in 0..50 {
                    let id = format!("T{t}-{i}");
                    log.append(entry(&[id.as_str()])).unwrap();
                }
            }));
        }
        for _ in 0..2 {
            let log = Arc::clone(&log);
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    for entry in log.list() {
                        assert!(entry.validate().is_ok());
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.len(), 200);
    }
}
