use crate::core::event_log::LogEntry;
use crossbeam_channel::{Sender, unbounded};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Callback invoked with every deadlock appended to the event log
pub type DeadlockCallback = Arc<dyn Fn(LogEntry) + Send + Sync>;

/// Background dispatcher for deadlock callbacks
///
/// Runs a dedicated thread that receives logged deadlocks through a channel
/// and executes the registered callback, so a slow or panicking callback
/// never stalls a simulation run.
pub struct Dispatcher {
    /// Channel sender for transmitting deadlock entries
    sender: Sender<LogEntry>,
    /// Background thread handle
    _thread_handle: JoinHandle<()>,
}

impl Dispatcher {
    /// Create a new dispatcher with a background thread and channel
    pub fn new(callback: DeadlockCallback) -> Self {
        let (tx, rx) = unbounded::<LogEntry>();

        let thread_handle = std::thread::spawn(move || {
            while let Ok(entry) = rx.recv() {
                callback(entry);
            }
        });

        Dispatcher {
            sender: tx,
            _thread_handle: thread_handle,
        }
    }

    /// Hand an entry to the background thread
    pub fn send(&self, entry: LogEntry) {
        // Dropped if the callback thread has died
        let _ = self.sender.send(entry);
    }
}
