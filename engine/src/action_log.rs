//! Append-only record of what a run wrote to the backup tree.
//!
//! One line per copied or encrypted file:
//!
//! ```text
//! 2026/10/18 09:14:03 Copied /home/me/notes.txt to /mnt/backup/notes.txt
//! 2026/10/18 09:14:03 Encrypted and copied /home/me/key.pem to /mnt/backup/key.pem
//! ```
//!
//! Skipped files and directories are not logged. The log is an explicit value
//! owned by the caller for the duration of one run; nothing global is touched.

use crate::error::EngineError;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name of the action log inside the backup root.
pub const LOG_FILE_NAME: &str = "backup.log";

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Line-oriented action log over any writer.
pub struct ActionLog<W: Write> {
    writer: W,
    path: PathBuf,
}

impl ActionLog<BufWriter<File>> {
    /// Open `<backup_root>/backup.log` for appending, creating the file if it
    /// does not exist yet.
    ///
    /// The backup root itself must already exist (see
    /// `mirror::prepare_destination`); a missing root is a `WriteError` on the
    /// log path.
    pub fn open_in(backup_root: &Path) -> Result<Self, EngineError> {
        let path = backup_root.join(LOG_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| EngineError::WriteError {
                path: path.clone(),
                source: e,
            })?;
        Ok(ActionLog {
            writer: BufWriter::new(file),
            path,
        })
    }
}

impl<W: Write> ActionLog<W> {
    /// Wrap an arbitrary writer; `path` is only used in error reports.
    pub fn new(writer: W, path: impl Into<PathBuf>) -> Self {
        ActionLog {
            writer,
            path: path.into(),
        }
    }

    /// Location reported in errors (the log file for `open_in`).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one written file. The line is flushed before returning.
    pub fn record_copy(
        &mut self,
        source: &Path,
        destination: &Path,
        encrypted: bool,
    ) -> Result<(), EngineError> {
        let verb = if encrypted {
            "Encrypted and copied"
        } else {
            "Copied"
        };
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT);

        writeln!(
            self.writer,
            "{} {} {} to {}",
            timestamp,
            verb,
            source.display(),
            destination.display()
        )
        .and_then(|_| self.writer.flush())
        .map_err(|e| EngineError::WriteError {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Consume the log and hand back the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_copy_line_format() {
        let mut log = ActionLog::new(Vec::new(), "memory");
        log.record_copy(Path::new("/src/notes.txt"), Path::new("/dst/notes.txt"), false)
            .expect("Record should succeed");
        log.record_copy(Path::new("/src/key.pem"), Path::new("/dst/key.pem"), true)
            .expect("Record should succeed");

        let text = String::from_utf8(log.into_inner()).expect("Log is UTF-8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" Copied /src/notes.txt to /dst/notes.txt"));
        assert!(lines[1].ends_with(" Encrypted and copied /src/key.pem to /dst/key.pem"));

        // "YYYY/MM/DD HH:MM:SS " prefix
        let stamp = &lines[0][..19];
        assert!(chrono::NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_open_in_appends_across_runs() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("backup");
        std::fs::create_dir(&root).expect("Failed to create root");

        {
            let mut log = ActionLog::open_in(&root).expect("Open should succeed");
            log.record_copy(Path::new("a"), Path::new("b"), false)
                .expect("Record should succeed");
        }
        {
            let mut log = ActionLog::open_in(&root).expect("Reopen should succeed");
            assert_eq!(log.path(), root.join(LOG_FILE_NAME));
            log.record_copy(Path::new("c"), Path::new("d"), false)
                .expect("Record should succeed");
        }

        let text = std::fs::read_to_string(root.join(LOG_FILE_NAME)).expect("Log exists");
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("Copied a to b"));
        assert!(text.contains("Copied c to d"));
    }

    #[test]
    fn test_open_in_missing_root_is_write_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("absent");

        match ActionLog::open_in(&root) {
            Err(EngineError::WriteError { path, .. }) => assert_eq!(path, root.join(LOG_FILE_NAME)),
            Err(other) => panic!("Expected WriteError, got {:?}", other),
            Ok(_) => panic!("Opening a log in a missing root should fail"),
        }
        assert!(!root.exists());
    }
}
