//! Append-only conversation transcript.
//!
//! Writes are fire-and-forget: a failing disk never interrupts a
//! conversation, it only produces a warning.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Sink for one line per utterance, reply and session boundary.
pub trait TranscriptLog: Send + Sync {
    fn append(&self, line: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTranscriptLog;

impl TranscriptLog for NullTranscriptLog {
    fn append(&self, _line: &str) {}
}

/// Appends timestamped lines to a file, creating it (and its parent
/// directory) on first write.
#[derive(Debug)]
pub struct FileTranscriptLog {
    path: PathBuf,
    // serialises appends so concurrent lines never interleave
    lock: Mutex<()>,
}

impl FileTranscriptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        writeln!(file, "[{secs}] {}", line.replace('\n', " "))
    }
}

impl TranscriptLog for FileTranscriptLog {
    fn append(&self, line: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = self.write_line(line) {
            log::warn!("transcript: append to {} failed: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appends_lines_in_order() {
        let dir = tempdir().unwrap();
        let log = FileTranscriptLog::new(dir.path().join("nested/transcript.log"));

        log.append("user: hello");
        log.append("assistant: hi\nthere");

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("user: hello"));
        assert!(lines[1].ends_with("assistant: hi there"));
    }

    #[test]
    fn unwritable_path_does_not_panic() {
        let dir = tempdir().unwrap();
        // a directory cannot be opened for appending
        let log = FileTranscriptLog::new(dir.path());
        log.append("lost");
    }
}
