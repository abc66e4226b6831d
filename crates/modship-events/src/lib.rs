//! Run log for modship.
//!
//! Every decision the publish engine makes lands here as one JSON line: the
//! attempt header, each platform answer and its verdict, bumps, rebuilds,
//! sleeps and notifications. The log is buffered in memory and appended to
//! `<state_dir>/events.jsonl` in batches, so a crash mid-run loses at most
//! the current attempt.
//!
//! # Example
//!
//! ```
//! use modship_events::EventLog;
//! use modship_types::{EventType, RunEvent};
//!
//! let mut log = EventLog::new();
//! log.record(RunEvent::now(
//!     EventType::AttemptStarted { attempt: 1, version: "1.4.2".to_string() },
//!     None,
//! ));
//! assert_eq!(log.len(), 1);
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use modship_types::{Platform, RunEvent};

pub const EVENTS_FILE_NAME: &str = "events.jsonl";

/// `<state_dir>/events.jsonl`
pub fn events_path(state_dir: &Path) -> PathBuf {
    state_dir.join(EVENTS_FILE_NAME)
}

#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<RunEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: RunEvent) {
        self.events.push(event);
    }

    /// Append the buffered events to `path`, creating it and its parent
    /// directory on first use. The buffer is left untouched.
    pub fn append_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create state dir {}", dir.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open event log {}", path.display()))?;
        let mut out = BufWriter::new(file);

        for event in &self.events {
            serde_json::to_writer(&mut out, event).context("failed to encode run event")?;
            out.write_all(b"\n")
                .with_context(|| format!("failed to append to {}", path.display()))?;
        }
        out.flush()
            .with_context(|| format!("failed to flush {}", path.display()))
    }

    /// Append the buffered events to `path` and empty the buffer. A no-op
    /// with nothing buffered, so an idle run never creates the file.
    pub fn flush_to(&mut self, path: &Path) -> Result<()> {
        if self.events.is_empty() {
            return Ok(());
        }
        self.append_to(path)?;
        self.events.clear();
        Ok(())
    }

    /// Load a log written by [`EventLog::append_to`]. A missing file is an
    /// empty log; blank lines are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to open event log {}", path.display()));
            }
        };

        let mut events = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(&line).with_context(|| {
                format!("{}:{}: not a run event", path.display(), idx + 1)
            })?;
            events.push(event);
        }
        Ok(Self { events })
    }

    pub fn for_platform(&self, platform: Platform) -> impl Iterator<Item = &RunEvent> {
        self.events
            .iter()
            .filter(move |event| event.platform == Some(platform))
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
