//! Mirror orchestration module.
//!
//! This module provides the run lifecycle:
//! - Creating a mirror job from source/destination paths
//! - Deciding, per entry, whether a copy is needed
//! - Running the walk, copying or sealing files as decided
//!
//! A run is fail-fast: the first error stops the walk and is returned with the
//! offending path. Files written before the error stay written.

use crate::action_log::ActionLog;
use crate::checksums::{self, ChecksumAlgorithm};
use crate::cipher::{self, CipherKey};
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{Action, EntryKind, MirrorJob, MirrorOptions, MirrorReport, TreeEntry};
use crate::progress::ProgressCallback;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};
use uuid::Uuid;

/// What has to happen to one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Directory: make sure it exists at the destination
    EnsureDirectory,
    /// Nothing at the destination path yet
    CopyNew,
    /// Destination exists but its digest differs from the source
    CopyChanged,
    /// Destination digest equals source digest
    Skip,
}

/// Decide what to do with `entry`.
///
/// Only raw content digests are compared. A destination holding a sealed
/// blob never matches its plaintext source, and a plaintext destination that
/// matches is skipped even when encryption is now enabled.
///
/// # Errors
/// A destination that exists but cannot be digested is an error, never a
/// "new file".
pub fn decide(entry: &TreeEntry, algorithm: ChecksumAlgorithm) -> Result<Decision, EngineError> {
    if entry.is_dir() {
        return Ok(Decision::EnsureDirectory);
    }

    match fs::metadata(&entry.destination_path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Decision::CopyNew),
        Err(e) => {
            return Err(EngineError::ReadError {
                path: entry.destination_path.clone(),
                source: e,
            })
        }
        Ok(_) => {}
    }

    if checksums::files_match(&entry.source_path, &entry.destination_path, algorithm)? {
        Ok(Decision::Skip)
    } else {
        Ok(Decision::CopyChanged)
    }
}

/// Create a new mirror job.
///
/// Validates that the source exists and is a directory, and that the
/// destination is a usable, distinct path. The destination may not exist
/// yet; it is created when the run starts.
///
/// # Errors
/// Returns EngineError if the source is missing or invalid, or if the
/// destination is empty or the same directory as the source.
pub fn create_mirror<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    destination: Q,
    options: MirrorOptions,
) -> Result<MirrorJob, EngineError> {
    let source = source.as_ref();
    let destination = destination.as_ref();

    match fs::metadata(source) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(EngineError::InvalidPath {
                path: source.to_path_buf(),
                reason: "Source must be a directory".to_string(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EngineError::SourceNotFound {
                path: source.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(EngineError::EnumerationFailed {
                path: source.to_path_buf(),
                source: e,
            })
        }
    }

    if destination.as_os_str().is_empty() {
        return Err(EngineError::InvalidPath {
            path: destination.to_path_buf(),
            reason: "Destination path is empty".to_string(),
        });
    }

    if let (Ok(src), Ok(dst)) = (source.canonicalize(), destination.canonicalize()) {
        if src == dst {
            return Err(EngineError::InvalidPath {
                path: destination.to_path_buf(),
                reason: "Destination must differ from source".to_string(),
            });
        }
    }

    Ok(MirrorJob {
        id: Uuid::new_v4(),
        source_path: source.to_path_buf(),
        destination_path: destination.to_path_buf(),
        options,
    })
}

/// Create the backup root with the source root's permission bits.
///
/// An existing root is left as it is. `run_mirror` calls this itself; callers
/// that put files into the root before the run (such as the action log) call
/// it first so the root does not get a default mode.
pub fn prepare_destination(job: &MirrorJob) -> Result<(), EngineError> {
    let root_mode = source_root_mode(&job.source_path)?;
    fs_ops::ensure_dir(&job.destination_path, root_mode)
}

/// Run a mirror job.
///
/// Walks the source tree, applying `decide` to every entry and carrying out
/// the decision. Every written file gets one line in `action_log`.
///
/// # Arguments
/// * `job` - Job from `create_mirror`
/// * `key` - Cipher key; required when `job.options.encrypt` is set
/// * `action_log` - Log owned by the caller for this run
/// * `progress_callback` - Optional callback for progress updates
///
/// # Errors
/// The first failure aborts the run. Encryption without a key fails before
/// any entry is touched.
pub fn run_mirror<W: Write>(
    job: &MirrorJob,
    key: Option<&CipherKey>,
    action_log: &mut ActionLog<W>,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<MirrorReport, EngineError> {
    let key = match (job.options.encrypt, key) {
        (true, None) => {
            return Err(EngineError::KeyUnavailable {
                reason: "encryption is enabled but no key was supplied".to_string(),
            })
        }
        (true, Some(key)) => Some(key),
        (false, _) => None,
    };

    let span = tracing::info_span!("mirror", run = %job.id);
    let _enter = span.enter();
    info!(
        source = %job.source_path.display(),
        destination = %job.destination_path.display(),
        encrypt = job.options.encrypt,
        "Mirror started"
    );

    let mut report = MirrorReport::new(SystemTime::now());

    // The root must exist before the walk lists the source, so a backup root
    // nested in the source tree can be recognised and pruned.
    prepare_destination(job)?;
    let excluded = nested_destination(&job.source_path, &job.destination_path);
    if let Some(ref path) = excluded {
        debug!(path = %path.display(), "Backup root lies inside source; pruning it");
    }

    if let Some(callback) = progress_callback {
        callback.on_mirror_started(job);
    }

    for entry in fs_ops::walk_tree(&job.source_path, &job.destination_path, excluded.as_deref())
    {
        let entry = entry?;
        let action = process_entry(job, &entry, key, action_log)?;
        report.record(action);

        if let Some(callback) = progress_callback {
            callback.on_entry_completed(job, &entry, action);
        }
    }

    report.finished_at = SystemTime::now();
    info!(
        copied = report.files_copied,
        encrypted = report.files_encrypted,
        skipped = report.files_skipped,
        bytes = report.bytes_written,
        "Mirror completed"
    );

    if let Some(callback) = progress_callback {
        callback.on_mirror_completed(job, &report);
    }

    Ok(report)
}

fn process_entry<W: Write>(
    job: &MirrorJob,
    entry: &TreeEntry,
    key: Option<&CipherKey>,
    action_log: &mut ActionLog<W>,
) -> Result<Action, EngineError> {
    let decision = decide(entry, job.options.checksum_algorithm)?;

    let action = match decision {
        Decision::EnsureDirectory => {
            fs_ops::ensure_dir(&entry.destination_path, entry.mode)?;
            Action::DirectoryEnsured
        }
        Decision::Skip => {
            debug!(path = %entry.relative_path.display(), "Unchanged; skipped");
            Action::Skipped
        }
        Decision::CopyNew | Decision::CopyChanged => {
            let action = match key {
                Some(key) => {
                    let plaintext = fs_ops::read_file(&entry.source_path)?;
                    let blob = cipher::seal(&plaintext, key.as_bytes())?;
                    let bytes = fs_ops::write_file(&entry.destination_path, &blob)?;
                    Action::Encrypted { bytes }
                }
                None => {
                    let bytes = fs_ops::copy_file(&entry.source_path, &entry.destination_path)?;
                    Action::Copied { bytes }
                }
            };

            let changed = decision == Decision::CopyChanged;
            action_log.record_copy(
                &entry.source_path,
                &entry.destination_path,
                matches!(action, Action::Encrypted { .. }),
            )?;
            info!(
                path = %entry.relative_path.display(),
                changed,
                "{}",
                action
            );
            action
        }
    };

    Ok(action)
}

fn source_root_mode(source: &Path) -> Result<u32, EngineError> {
    let metadata = fs::metadata(source).map_err(|e| EngineError::EnumerationFailed {
        path: source.to_path_buf(),
        source: e,
    })?;
    Ok(fs_ops::mode_of(&metadata, EntryKind::Directory))
}

/// If `destination` lies strictly inside `source`, return it expressed as a
/// path below `source` (the form the walker produces).
fn nested_destination(source: &Path, destination: &Path) -> Option<PathBuf> {
    let source_canon = source.canonicalize().ok()?;
    let dest_canon = destination.canonicalize().ok()?;
    let relative = dest_canon.strip_prefix(&source_canon).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(source.join(relative))
}
