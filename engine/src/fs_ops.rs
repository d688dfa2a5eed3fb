//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Walking the source tree, directories before their contents
//! - Creating destination directories with the source mode bits
//! - Copying or writing destination files with overwrite
//!
//! Every file handle opened here is dropped before the function returns, on
//! success and error paths alike.

use crate::error::EngineError;
use crate::model::{EntryKind, TreeEntry};
use filetime::FileTime;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const DEFAULT_DIR_MODE: u32 = 0o755;
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Walk the source tree and project every node onto `destination_root`.
///
/// The root itself comes first (with an empty relative path), then a
/// depth-first pre-order traversal with siblings sorted by name. Symbolic
/// links are not followed; they are reported as files.
///
/// `exclude` names a subtree (in the same form as `source.join(..)`) that is
/// pruned from the walk together with everything below it.
///
/// The iterator is lazy: an error for one node is yielded in place and the
/// caller decides whether to keep going.
pub fn walk_tree<'a>(
    source: &'a Path,
    destination_root: &'a Path,
    exclude: Option<&'a Path>,
) -> impl Iterator<Item = Result<TreeEntry, EngineError>> + 'a {
    WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| Some(entry.path()) != exclude)
        .map(move |entry| -> Result<TreeEntry, EngineError> {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| source.to_path_buf());
                EngineError::EnumerationFailed {
                    path,
                    source: io::Error::from(e),
                }
            })?;

            let metadata = entry.metadata().map_err(|e| EngineError::EnumerationFailed {
                path: entry.path().to_path_buf(),
                source: io::Error::from(e),
            })?;

            let kind = if metadata.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };

            let relative_path = relative_to(entry.path(), source)?;
            let destination_path = if relative_path.as_os_str().is_empty() {
                destination_root.to_path_buf()
            } else {
                destination_root.join(&relative_path)
            };

            Ok(TreeEntry {
                source_path: entry.path().to_path_buf(),
                relative_path,
                destination_path,
                kind,
                mode: mode_of(&metadata, kind),
            })
        })
}

fn relative_to(path: &Path, root: &Path) -> Result<PathBuf, EngineError> {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(|_| EngineError::InvalidPath {
            path: path.to_path_buf(),
            reason: format!("not below source root {}", root.display()),
        })
}

/// Permission bits of a source node.
#[cfg(unix)]
pub(crate) fn mode_of(metadata: &fs::Metadata, _kind: EntryKind) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
pub(crate) fn mode_of(_metadata: &fs::Metadata, kind: EntryKind) -> u32 {
    match kind {
        EntryKind::Directory => DEFAULT_DIR_MODE,
        EntryKind::File => 0o644,
    }
}

/// Create a directory and any missing parents.
///
/// `mode` applies only to directories created by this call (subject to the
/// process umask); an existing directory is left untouched.
pub fn ensure_dir(path: &Path, mode: u32) -> Result<(), EngineError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    builder
        .create(path)
        .map_err(|e| EngineError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Stream-copy a file to `dst`, replacing any existing content.
///
/// The source modification time is carried over to the copy.
///
/// # Errors
/// Failures opening or reading `src` are `ReadError` on `src`; failures
/// creating, writing or stamping `dst` (disk full included) are `WriteError`
/// on `dst`.
///
/// # Returns
/// Number of bytes copied
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;

    let read_error = |e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    };
    let write_error = |e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    };

    let mut src_file = fs::File::open(src).map_err(read_error)?;
    let src_metadata = src_file.metadata().map_err(read_error)?;
    let src_mtime = FileTime::from_last_modification_time(&src_metadata);
    let mut dst_file = fs::File::create(dst).map_err(write_error)?;

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut bytes_copied = 0u64;
    loop {
        let n = match src_file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(e)),
        };
        dst_file.write_all(&buffer[..n]).map_err(write_error)?;
        bytes_copied += n as u64;
    }
    dst_file.flush().map_err(write_error)?;

    filetime::set_file_handle_times(&dst_file, None, Some(src_mtime)).map_err(write_error)?;

    Ok(bytes_copied)
}

/// Read a whole file into memory.
pub fn read_file(path: &Path) -> Result<Vec<u8>, EngineError> {
    fs::read(path).map_err(|e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write `contents` to `dst`, replacing any existing content.
pub fn write_file(dst: &Path, contents: &[u8]) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;
    fs::write(dst, contents).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;
    Ok(contents.len() as u64)
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns EngineError if the parent exists but is not a directory, or if
/// creating it fails.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => ensure_dir(parent, DEFAULT_DIR_MODE),
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(src: &Path, dst: &Path) -> Vec<TreeEntry> {
        walk_tree(src, dst, None)
            .collect::<Result<Vec<_>, _>>()
            .expect("Failed to walk")
    }

    #[test]
    fn test_walk_flat_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        fs::write(src.join("file2.txt"), b"test data 2").expect("Failed to write file2");
        fs::write(src.join("file1.txt"), b"test data 1").expect("Failed to write file1");
        let dst = temp_dir.path().join("dst");

        let items = collect(&src, &dst);

        assert_eq!(items.len(), 3);
        assert!(items[0].is_dir());
        assert_eq!(items[0].relative_path, PathBuf::new());
        assert_eq!(items[0].destination_path, dst);
        assert_eq!(items[1].relative_path, PathBuf::from("file1.txt"));
        assert_eq!(items[2].relative_path, PathBuf::from("file2.txt"));
        assert_eq!(items[2].destination_path, dst.join("file2.txt"));
        assert_eq!(items[2].kind, EntryKind::File);
    }

    #[test]
    fn test_walk_visits_directories_before_contents() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("a").join("b")).expect("Failed to create nested dirs");
        fs::write(src.join("a").join("b").join("c.txt"), b"c").expect("Failed to write c");
        let dst = temp_dir.path().join("dst");

        let rels: Vec<PathBuf> = collect(&src, &dst)
            .into_iter()
            .map(|e| e.relative_path)
            .collect();

        assert_eq!(
            rels,
            vec![
                PathBuf::new(),
                PathBuf::from("a"),
                PathBuf::from("a/b"),
                PathBuf::from("a/b/c.txt"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_reports_mode_bits() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        let script = src.join("run.sh");
        fs::write(&script, b"#!/bin/sh\n").expect("Failed to write script");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o750))
            .expect("Failed to chmod");

        let items = collect(&src, temp_dir.path());
        assert_eq!(items[1].mode, 0o750);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_treats_symlink_as_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("real")).expect("Failed to create dir");
        std::os::unix::fs::symlink(src.join("real"), src.join("link"))
            .expect("Failed to symlink");

        let items = collect(&src, temp_dir.path());
        let link = items
            .iter()
            .find(|e| e.relative_path == Path::new("link"))
            .expect("link should be listed");
        assert_eq!(link.kind, EntryKind::File);
    }

    #[test]
    fn test_walk_prunes_excluded_subtree() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("backup").join("old")).expect("Failed to create dirs");
        fs::write(src.join("backup").join("old").join("x.txt"), b"x").expect("Failed to write");
        fs::write(src.join("keep.txt"), b"k").expect("Failed to write");
        let excluded = src.join("backup");

        let rels: Vec<PathBuf> = walk_tree(&src, &excluded, Some(&excluded))
            .map(|e| e.expect("Walk should succeed").relative_path)
            .collect();

        assert_eq!(rels, vec![PathBuf::new(), PathBuf::from("keep.txt")]);
    }

    #[test]
    fn test_walk_nonexistent_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("nonexistent");
        let dst = temp_dir.path().join("dst");

        let mut walk = walk_tree(&src, &dst, None);
        match walk.next() {
            Some(Err(EngineError::EnumerationFailed { path, .. })) => assert_eq!(path, src),
            other => panic!("Expected EnumerationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_copy_file_overwrites() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("dest.txt");
        fs::write(&src_file, b"test content").expect("Failed to write source");
        fs::write(&dst_file, b"much longer stale content").expect("Failed to write dest");

        let bytes = copy_file(&src_file, &dst_file).expect("Failed to copy");
        assert_eq!(bytes, 12);
        assert_eq!(fs::read(&dst_file).expect("Failed to read dest"), b"test content");
    }

    #[test]
    fn test_copy_file_preserves_mtime() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("dest.txt");
        fs::write(&src_file, b"x").expect("Failed to write source");
        let past = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&src_file, past).expect("Failed to set mtime");

        copy_file(&src_file, &dst_file).expect("Failed to copy");

        let meta = fs::metadata(&dst_file).expect("Failed to stat dest");
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), past);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_copy_to_full_device_is_write_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        fs::write(&src_file, b"does not fit").expect("Failed to write source");
        let full = Path::new("/dev/full");

        match copy_file(&src_file, full) {
            Err(EngineError::WriteError { path, source }) => {
                assert_eq!(path, full);
                assert_eq!(source.raw_os_error(), Some(28)); // ENOSPC
            }
            other => panic!("Expected WriteError on destination, got {:?}", other),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_copy_timestamp_failure_is_write_error() {
        use std::os::unix::fs::MetadataExt;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        fs::write(&src_file, b"x").expect("Failed to write source");
        let own_uid = fs::metadata(&src_file).expect("Failed to stat source").uid();
        let null = Path::new("/dev/null");
        // Only the owner (or root) may set explicit timestamps on /dev/null.
        if own_uid == 0 || fs::metadata(null).expect("Failed to stat /dev/null").uid() == own_uid {
            return;
        }

        match copy_file(&src_file, null) {
            Err(EngineError::WriteError { path, .. }) => assert_eq!(path, null),
            other => panic!("Expected WriteError on destination, got {:?}", other),
        }
    }

    #[test]
    fn test_copy_missing_source_is_read_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = copy_file(&temp_dir.path().join("nope"), &temp_dir.path().join("dst"));
        assert!(matches!(result, Err(EngineError::ReadError { .. })));
    }

    #[test]
    fn test_write_file_creates_parent() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dst = temp_dir.path().join("x").join("y.bin");

        let written = write_file(&dst, &[1, 2, 3]).expect("Failed to write");
        assert_eq!(written, 3);
        assert_eq!(fs::read(&dst).expect("Failed to read"), vec![1, 2, 3]);
    }

    #[test]
    fn test_ensure_dir_is_recursive_and_idempotent() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let nested = temp_dir.path().join("a").join("b");

        ensure_dir(&nested, 0o755).expect("Failed to create");
        ensure_dir(&nested, 0o755).expect("Existing directory should be fine");
        assert!(nested.is_dir());
    }

    #[test]
    fn test_ensure_dir_over_file_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"").expect("Failed to write blocker");

        let result = ensure_dir(&blocker, 0o755);
        assert!(matches!(result, Err(EngineError::DirectoryCreationFailed { .. })));
    }

    #[test]
    fn test_ensure_parent_dir_exists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("subdir").join("file.txt");

        ensure_parent_dir_exists(&path).expect("Failed to create parent");
        assert!(path.parent().unwrap().exists());
    }
}
