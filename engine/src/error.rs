//! Error types for the mirror engine.
//!
//! Every failure during a run is fatal: the walk stops at the first error and
//! hands it back to the caller with the offending path attached. There is no
//! per-file error recording.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a mirror run, or prevent one from starting.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source directory does not exist
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Path is unusable for the requested role
    #[error("Invalid path: {} ({reason})", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Failed to open or read a file (source, or destination while digesting)
    #[error("Failed to read file: {}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create or write a destination file
    #[error("Failed to write file: {}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to enumerate the source tree
    #[error("Failed to enumerate directory: {}", path.display())]
    EnumerationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a destination directory
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Cipher key has the wrong size for AES-256
    #[error("Invalid cipher key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    /// The OS random source could not produce an IV
    #[error("Random source unavailable: {reason}")]
    RandomUnavailable { reason: String },

    /// Encryption was requested but no usable key was supplied
    #[error("Cipher key unavailable: {reason}")]
    KeyUnavailable { reason: String },

    /// Configuration file could not be read
    #[error("Failed to read configuration: {}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file is not valid JSON for the expected shape
    #[error("Malformed configuration: {}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file could not be written
    #[error("Failed to save configuration: {}", path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<u32> {
        match self {
            Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::ConfigRead { source, .. }
            | Self::ConfigWrite { source, .. } => source.raw_os_error().map(|e| e as u32),
            _ => None,
        }
    }

    /// The filesystem path this error is about, if it has one.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::SourceNotFound { path }
            | Self::InvalidPath { path, .. }
            | Self::ReadError { path, .. }
            | Self::WriteError { path, .. }
            | Self::EnumerationFailed { path, .. }
            | Self::DirectoryCreationFailed { path, .. }
            | Self::ConfigRead { path, .. }
            | Self::ConfigParse { path, .. }
            | Self::ConfigWrite { path, .. } => Some(path),
            Self::InvalidKeyLength { .. }
            | Self::RandomUnavailable { .. }
            | Self::KeyUnavailable { .. } => None,
        }
    }
}
