pub mod encoder;
pub use encoder::{decode_log, encode_log};

use crate::core::event_log::LogEntry;
use anyhow::{Context, Result};

/// Viewer used when none is given: the dashboard's default local address
pub const DEFAULT_VIEWER_URL: &str = "http://localhost:5000/";

/// Build the viewer URL carrying `entries` as its `logs` parameter
pub fn showcase_url(viewer: &str, entries: &[LogEntry]) -> Result<String> {
    let encoded = encode_log(entries).context("Failed to encode event log for URL")?;
    let separator = if viewer.contains('?') { '&' } else { '?' };
    Ok(format!("{viewer}{separator}logs={encoded}"))
}

/// Showcase the event log in the viewer
///
/// Encodes the given entries and opens a browser window on the viewer with the
/// encoded log attached, so past deadlocks can be replayed graphically.
///
/// # Errors
/// Returns an error if:
/// - Failed to encode the log
/// - Failed to open the browser
///
/// # Example
///
/// ```no_run
/// use wfgscope::{Wfgscope, showcase};
///
/// let dashboard = Wfgscope::new().with_store("deadlocks.jsonl").start().unwrap();
/// showcase::showcase(showcase::DEFAULT_VIEWER_URL, &dashboard.logs()).unwrap();
/// ```
pub fn showcase(viewer: &str, entries: &[LogEntry]) -> Result<()> {
    let url = showcase_url(viewer, entries)?;

    // Open the URL in the default web browser.
    webbrowser::open(&url).context("Failed to open browser")?;

    Ok(())
}
