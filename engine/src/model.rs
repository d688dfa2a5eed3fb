//! Core data model for mirror runs.
//!
//! This module defines the structures a run works with:
//! - MirrorJob: one source tree mirrored onto one backup root
//! - TreeEntry: a single node met during the walk
//! - Action: what the walker did with an entry
//! - MirrorReport: counters for a finished run

use crate::checksums::ChecksumAlgorithm;
use std::path::PathBuf;
use std::time::SystemTime;
use uuid::Uuid;

/// A configured mirror run.
///
/// Created by `create_mirror`, which validates the paths; executed by
/// `run_mirror`. A job holds no per-file state, entries are produced and
/// consumed one at a time during the walk.
#[derive(Debug, Clone)]
pub struct MirrorJob {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Root source directory
    pub source_path: PathBuf,

    /// Root of the backup tree
    pub destination_path: PathBuf,

    /// Behaviour switches
    pub options: MirrorOptions,
}

/// Switches controlling a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MirrorOptions {
    /// Seal file contents before writing them to the destination
    pub encrypt: bool,

    /// Digest used to decide whether an existing destination is current
    pub checksum_algorithm: ChecksumAlgorithm,
}

/// Kind of filesystem node met during the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    /// Anything that is not a directory, symbolic links included
    File,
}

/// A single node of the source tree, projected onto the backup root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Full source path
    pub source_path: PathBuf,

    /// Path relative to the source root (empty for the root itself)
    pub relative_path: PathBuf,

    /// `destination_root.join(relative_path)`
    pub destination_path: PathBuf,

    pub kind: EntryKind,

    /// Permission bits of the source node
    pub mode: u32,
}

impl TreeEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// What the walker did with one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Destination directory exists (created now or already present)
    DirectoryEnsured,
    /// Plain bytes streamed to the destination
    Copied { bytes: u64 },
    /// Sealed blob written to the destination
    Encrypted { bytes: u64 },
    /// Destination digest already equals source digest
    Skipped,
}

impl Action {
    /// True if the destination file was (re)written.
    pub fn wrote_file(&self) -> bool {
        matches!(self, Action::Copied { .. } | Action::Encrypted { .. })
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::DirectoryEnsured => write!(f, "Directory"),
            Action::Copied { .. } => write!(f, "Copied"),
            Action::Encrypted { .. } => write!(f, "Encrypted"),
            Action::Skipped => write!(f, "Skipped"),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    /// Files written to the destination, encrypted ones included
    pub files_copied: u64,

    /// Subset of `files_copied` that were sealed
    pub files_encrypted: u64,

    /// Files whose destination was already identical
    pub files_skipped: u64,

    /// Directories visited (the root included)
    pub directories: u64,

    /// Bytes written to destination files
    pub bytes_written: u64,

    pub started_at: SystemTime,

    pub finished_at: SystemTime,
}

impl MirrorReport {
    pub(crate) fn new(started_at: SystemTime) -> Self {
        MirrorReport {
            files_copied: 0,
            files_encrypted: 0,
            files_skipped: 0,
            directories: 0,
            bytes_written: 0,
            started_at,
            finished_at: started_at,
        }
    }

    /// Fold one entry outcome into the counters.
    pub(crate) fn record(&mut self, action: Action) {
        match action {
            Action::DirectoryEnsured => self.directories += 1,
            Action::Copied { bytes } => {
                self.files_copied += 1;
                self.bytes_written += bytes;
            }
            Action::Encrypted { bytes } => {
                self.files_copied += 1;
                self.files_encrypted += 1;
                self.bytes_written += bytes;
            }
            Action::Skipped => self.files_skipped += 1,
        }
    }
}
