//! Activity logger for simulation runs and watch loops
//!
//! Records phase transitions, injections, detections and failures as JSON
//! lines. Writes happen on a dedicated background thread fed through a
//! channel, so a run never blocks on disk I/O. `flush()` blocks until
//! everything sent before it is on disk, and dropping the logger flushes too.

use crate::core::types::{Cycle, RunId, SimulationPhase};
use anyhow::{Context, Result};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// What happened
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "activity", rename_all = "snake_case")]
pub enum Activity {
    /// A run entered a new phase
    Phase { run_id: RunId, phase: SimulationPhase },
    /// Injection added edges to the evaluated snapshot
    Injected { run_id: RunId, edges: usize },
    /// A deadlock was confirmed and logged
    Detected {
        #[serde(skip_serializing_if = "Option::is_none")]
        run_id: Option<RunId>,
        cycle: Cycle,
    },
    /// A run or a watch tick failed
    Failed {
        #[serde(skip_serializing_if = "Option::is_none")]
        run_id: Option<RunId>,
        error: String,
    },
    /// A run was abandoned by its caller
    Abandoned { run_id: RunId },
    /// One pass of the watch loop
    WatchTick { tick: u64, deadlock: bool },
}

/// A single activity line
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    /// Seconds since the Unix epoch, microsecond precision
    pub timestamp: f64,
    #[serde(flatten)]
    pub activity: Activity,
}

/// Commands for controlling the logger thread
#[derive(Debug)]
enum LoggerCommand {
    Record(LogRecord),
    /// Flush all pending records to disk and signal completion
    Flush(Sender<()>),
}

/// JSON-lines activity logger
pub struct ActivityLogger {
    sender: Sender<LoggerCommand>,
    path: PathBuf,
}

impl Drop for ActivityLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            eprintln!("Warning: Failed to flush activity log during drop: {e:?}");
        }
    }
}

impl ActivityLogger {
    /// Create a logger writing to `path`
    ///
    /// If the file name contains `{timestamp}` it is replaced with the current
    /// time. Missing parent directories are created and an existing file is
    /// truncated.
    ///
    /// # Errors
    /// Returns an error if the directory or the file can't be created.
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();

        // Replace timestamp placeholder if present
        #[allow(clippy::literal_string_with_formatting_args)]
        let file_path = if path_buf.to_string_lossy().contains("{timestamp}") {
            let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
            PathBuf::from(
                path_buf
                    .to_string_lossy()
                    .replace("{timestamp}", &timestamp.to_string()),
            )
        } else {
            path_buf
        };

        if let Some(parent) = file_path.parent()
            && parent.to_string_lossy() != ""
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).context("Failed to create log directory")?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&file_path)
            .context("Failed to open activity log file")?;

        let (tx, rx) = unbounded::<LoggerCommand>();
        thread::Builder::new()
            .name("wfgscope-logger".into())
            .spawn(move || logger_thread(file, rx))
            .context("Failed to spawn logger thread")?;

        CURRENT_LOG_FILE.lock().replace(file_path.clone());

        Ok(ActivityLogger {
            sender: tx,
            path: file_path,
        })
    }

    /// Path actually written to, after placeholder substitution
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue an activity record; never blocks on I/O
    pub fn record(&self, activity: Activity) {
        let now = Utc::now();
        let timestamp = now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1_000_000.0;

        let record = LogRecord {
            timestamp,
            activity,
        };
        if let Err(e) = self.sender.send(LoggerCommand::Record(record)) {
            eprintln!("Failed to send activity record: {e:?}");
        }
    }

    /// Block until every queued record is written and flushed
    ///
    /// # Errors
    /// Returns an error if the logger thread is gone or doesn't answer in time.
    pub fn flush(&self) -> Result<()> {
        let (flush_tx, flush_rx) = crossbeam_channel::bounded(1);
        self.sender
            .send(LoggerCommand::Flush(flush_tx))
            .context("Logger thread is gone")?;
        flush_rx
            .recv_timeout(FLUSH_TIMEOUT)
            .map_err(|_| anyhow::anyhow!("Flush operation timed out"))
    }
}

fn logger_thread(file: File, rx: Receiver<LoggerCommand>) {
    let mut writer = BufWriter::new(file);

    while let Ok(cmd) = rx.recv() {
        match cmd {
            LoggerCommand::Record(record) => {
                if let Ok(json) = serde_json::to_string(&record)
                    && let Err(e) = writeln!(writer, "{json}")
                {
                    eprintln!("Logger write error: {e:?}");
                }
            }
            LoggerCommand::Flush(responder) => {
                if let Err(e) = writer.flush() {
                    eprintln!("Logger flush error: {e:?}");
                }
                let _ = responder.send(());
            }
        }
    }

    // Channel closed
    if let Err(e) = writer.flush() {
        eprintln!("Logger final flush error: {e:?}");
    }
}

lazy_static::lazy_static! {
    static ref CURRENT_LOG_FILE: Mutex<Option<PathBuf>> = Mutex::new(None);
}

/// Path of the most recently opened activity log
pub fn current_log_file() -> Option<PathBuf> {
    CURRENT_LOG_FILE.lock().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Resolution;
    use tempfile::TempDir;

    #[test]
    fn test_records_are_json_lines() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("activity.log");

        let logger = ActivityLogger::with_file(&log_path).unwrap();
        logger.record(Activity::Phase {
            run_id: 1,
            phase: SimulationPhase::Checking,
        });
        logger.record(Activity::Injected { run_id: 1, edges: 6 });
        logger.record(Activity::Phase {
            run_id: 1,
            phase: SimulationPhase::Resolved(Resolution::Clear),
        });
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains(r#""activity":"phase""#));
        assert!(lines[0].contains(r#""phase":"checking""#));
        assert!(lines[1].contains(r#""edges":6"#));
        assert!(lines[2].contains(r#""resolution":"clear""#));
    }

    #[test]
    fn test_flush_idempotence() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("flush.log");

        let logger = ActivityLogger::with_file(&log_path).unwrap();
        for tick in 0..10 {
            logger.record(Activity::WatchTick {
                tick,
                deadlock: false,
            });
        }
        logger.flush().unwrap();
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents.lines().count(), 10);
    }

    #[test]
    fn test_timestamp_placeholder() {
        let temp_dir = TempDir::new().unwrap();
        let pattern = temp_dir.path().join("logs").join("activity_{timestamp}.log");

        let logger = ActivityLogger::with_file(&pattern).unwrap();
        let name = logger.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("activity_"));
        assert!(!name.contains("{timestamp}"));
        assert!(logger.path().exists());
    }

    #[test]
    fn test_drop_flushes() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("drop.log");

        {
            let logger = ActivityLogger::with_file(&log_path).unwrap();
            logger.record(Activity::Abandoned { run_id: 3 });
        }

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains(r#""run_id":3"#));
    }
}
