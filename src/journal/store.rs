use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::warn;

use super::record::JournalRecord;

const EVENTS_FILE_NAME: &str = "events.jsonl";

/// Default retention period in days.
pub const DEFAULT_RETENTION_DAYS: u64 = 30;

/// Errors that can occur during journal operations.
#[derive(Error, Debug)]
pub enum JournalError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Append-only JSONL log of applied transitions.
#[derive(Debug, Clone)]
pub struct Journal {
    root_dir: PathBuf,
    retention_days: u64,
}

impl Journal {
    /// Open (creating if needed) the journal directory.
    pub fn new(root_dir: impl Into<PathBuf>, retention_days: u64) -> JournalResult<Self> {
        let root_dir = root_dir.into();
        fs::create_dir_all(&root_dir)?;
        Ok(Self {
            root_dir,
            retention_days,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn events_path(&self) -> PathBuf {
        self.root_dir.join(EVENTS_FILE_NAME)
    }

    /// Append one record and sync it to disk.
    pub fn append(&self, record: &JournalRecord) -> JournalResult<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.events_path())?;

        let json = serde_json::to_string(record)?;
        writeln!(file, "{}", json)?;
        file.sync_all()?;
        Ok(())
    }

    /// Every record in append order. Unreadable lines are skipped with a warning.
    pub fn read_all(&self) -> JournalResult<Vec<JournalRecord>> {
        let file = match fs::File::open(self.events_path()) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(JournalError::Io(err)),
        };

        let mut records = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(&line) {
                Ok(record) => records.push(record),
                Err(err) => warn!(line = line_no + 1, error = %err, "skipping unreadable journal line"),
            }
        }
        Ok(records)
    }

    /// Records that concern `epic`.
    pub fn history(&self, epic: &str) -> JournalResult<Vec<JournalRecord>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.epic.as_deref() == Some(epic))
            .collect())
    }

    /// Drop records older than the retention period. Returns how many were removed.
    pub fn enforce_retention(&self) -> JournalResult<usize> {
        if self.retention_days == 0 {
            return Ok(0);
        }

        let records = self.read_all()?;
        let cutoff = Utc::now() - Duration::days(self.retention_days as i64);
        let (kept, expired): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|r| r.recorded_at >= cutoff);
        if expired.is_empty() {
            return Ok(0);
        }

        let temp_path = self.root_dir.join(format!("{}.tmp", EVENTS_FILE_NAME));
        let mut file = fs::File::create(&temp_path)?;
        for record in &kept {
            writeln!(file, "{}", serde_json::to_string(record)?)?;
        }
        file.sync_all()?;
        fs::rename(&temp_path, self.events_path())?;

        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epic::EpicState;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read_back() {
        let temp_dir = TempDir::new().expect("temp dir");
        let journal = Journal::new(temp_dir.path().join("journal"), 30).expect("journal");

        let record = JournalRecord::new("assign")
            .with_epic("epic-auth-api")
            .with_transition(EpicState::ContractsLocked, EpicState::Implementing)
            .with_agent("backend-agent");
        journal.append(&record).expect("append");
        journal
            .append(&JournalRecord::new("add").with_epic("epic-other"))
            .expect("append");

        assert!(journal.root_dir().join(EVENTS_FILE_NAME).exists());
        assert_eq!(journal.read_all().expect("read").len(), 2);
        assert_eq!(journal.history("epic-auth-api").expect("history"), vec![record]);
    }

    #[test]
    fn test_unreadable_lines_are_skipped() {
        let temp_dir = TempDir::new().expect("temp dir");
        let journal = Journal::new(temp_dir.path(), 30).expect("journal");
        journal.append(&JournalRecord::new("add")).expect("append");
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(temp_dir.path().join(EVENTS_FILE_NAME))
            .expect("open");
        writeln!(file, "not json").expect("write");

        assert_eq!(journal.read_all().expect("read").len(), 1);
    }

    #[test]
    fn test_enforce_retention_drops_expired_records() {
        let temp_dir = TempDir::new().expect("temp dir");
        let journal = Journal::new(temp_dir.path(), 30).expect("journal");

        let mut old = JournalRecord::new("park").with_epic("epic-old");
        old.recorded_at = Utc::now() - Duration::days(45);
        journal.append(&old).expect("append");
        journal
            .append(&JournalRecord::new("assign").with_epic("epic-new"))
            .expect("append");

        assert_eq!(journal.enforce_retention().expect("retention"), 1);
        let remaining = journal.read_all().expect("read");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].epic.as_deref(), Some("epic-new"));
    }

    #[test]
    fn test_enforce_retention_disabled() {
        let temp_dir = TempDir::new().expect("temp dir");
        let journal = Journal::new(temp_dir.path(), 0).expect("journal");
        let mut old = JournalRecord::new("park");
        old.recorded_at = Utc::now() - Duration::days(400);
        journal.append(&old).expect("append");

        assert_eq!(journal.enforce_retention().expect("retention"), 0);
        assert_eq!(journal.read_all().expect("read").len(), 1);
    }
}
