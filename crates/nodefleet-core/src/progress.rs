//! Human-readable progress lines emitted while recreating node containers.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

/// Receives one line per unit as it begins. Shared across unit tasks.
pub trait ProgressSink: Send + Sync {
    fn line(&self, line: &str);
}

/// Drops every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardProgress;

impl ProgressSink for DiscardProgress {
    fn line(&self, _line: &str) {}
}

/// Writes each line, newline-terminated, to a shared writer.
///
/// Write errors are ignored; progress output never fails a run.
pub struct WriterProgress<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterProgress<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> ProgressSink for WriterProgress<W> {
    fn line(&self, line: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(writer, "{line}");
        let _ = writer.flush();
    }
}

/// Keeps lines in memory.
#[derive(Debug, Default)]
pub struct CollectingProgress {
    lines: Mutex<Vec<String>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProgressSink for CollectingProgress {
    fn line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}
