//! # Mirror Engine - incremental backup library
//!
//! A headless engine that mirrors a source directory tree onto a backup root,
//! optionally sealing file contents with AES-256-CFB.
//!
//! ## Overview
//!
//! For each node of the source tree the walker decides whether work is
//! needed:
//! - Directories are created at the destination with the source mode bits
//! - Files missing at the destination are copied (or sealed)
//! - Files present at the destination are digested on both sides and only
//!   rewritten when the digests differ
//!
//! The run is single-threaded and fail-fast: the first error aborts the walk
//! and is returned with the offending path.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use mirror_engine::{create_mirror, prepare_destination, run_mirror, ActionLog, MirrorOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let job = create_mirror("/home/me/docs", "/mnt/backup", MirrorOptions::default())?;
//! prepare_destination(&job)?;
//! let mut log = ActionLog::open_in(&job.destination_path)?;
//!
//! let report = run_mirror(&job, None, &mut log, None)?;
//! println!("{} copied, {} unchanged", report.files_copied, report.files_skipped);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (MirrorJob, TreeEntry, Action, MirrorReport)
//! - **error**: Error types and handling
//! - **fs_ops**: Low-level filesystem operations
//! - **mirror**: Run orchestration (create, decide, run)
//! - **checksums**: Content digests
//! - **cipher**: Content sealing and key loading
//! - **action_log**: The `backup.log` writer
//! - **config**: Persisted settings
//! - **progress**: Progress callback trait

pub mod action_log;
pub mod checksums;
pub mod cipher;
pub mod config;
pub mod error;
pub mod fs_ops;
pub mod mirror;
pub mod model;
pub mod progress;

// Re-export main types and functions
pub use action_log::ActionLog;
pub use checksums::{digest, ChecksumAlgorithm, ChecksumValue};
pub use cipher::{seal, CipherKey};
pub use config::Config;
pub use error::EngineError;
pub use mirror::{create_mirror, decide, prepare_destination, run_mirror, Decision};
pub use model::{Action, EntryKind, MirrorJob, MirrorOptions, MirrorReport, TreeEntry};
pub use progress::ProgressCallback;
