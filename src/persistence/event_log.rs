use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::Event;

/// Sequenced, append-only, flush-per-append event sink and reader.
///
/// One JSON object per line. The sequence counter starts at 0 and
/// `next_sequence` pre-increments, so the first event carries sequence 1.
/// The mutex guards the file handle; the counter itself is driven by the
/// single-threaded engine.
#[derive(Debug)]
pub struct EventLog {
    path: Option<PathBuf>,
    file: Option<Mutex<File>>,
    sequence: u64,
}

impl EventLog {
    /// Open (creating if needed) an append-mode log at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Some(Mutex::new(file)),
            sequence: 0,
        })
    }

    /// A log with no backing file: appends are dropped, reads are empty.
    pub fn disabled() -> Self {
        Self {
            path: None,
            file: None,
            sequence: 0,
        }
    }

    pub fn append(&self, event: &Event) -> anyhow::Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let line = serde_json::to_string(event)?;
        let mut file = file
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    pub fn read_all(&self) -> anyhow::Result<Vec<Event>> {
        self.read_from(0)
    }

    /// Events with `sequence >= start_sequence`, in file order. Blank and
    /// malformed lines are skipped silently.
    pub fn read_from(&self, start_sequence: u64) -> anyhow::Result<Vec<Event>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let Ok(event) = serde_json::from_str::<Event>(&line) else {
                continue;
            };
            if event.sequence >= start_sequence {
                events.push(event);
            }
        }
        Ok(events)
    }

    pub fn current_sequence(&self) -> u64 {
        self.sequence
    }

    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Raise the counter to at least `sequence`. Recovery uses this so new
    /// events continue the file instead of re-issuing used sequences.
    pub fn advance_to(&mut self, sequence: u64) {
        self.sequence = self.sequence.max(sequence);
    }
}
