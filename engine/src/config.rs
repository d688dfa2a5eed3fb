//! Persisted settings.
//!
//! A small JSON object:
//!
//! ```json
//! {
//!   "backupRoot": "/mnt/backup",
//!   "keyFile": "/etc/backup/mirror.key"
//! }
//! ```
//!
//! `backupRoot` is required. `keyFile` is optional and only consulted when a
//! run is encrypted and no key was given any other way.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Root directory of the backup tree
    pub backup_root: PathBuf,

    /// File holding the cipher key (32 raw bytes or 64 hex characters)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

impl Config {
    pub fn new(backup_root: impl Into<PathBuf>) -> Self {
        Config {
            backup_root: backup_root.into(),
            key_file: None,
        }
    }

    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// `ConfigRead` if the file cannot be read, `ConfigParse` if it is not a
    /// JSON object with a string `backupRoot`.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write the configuration as pretty-printed JSON, replacing the file.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let data = serde_json::to_string_pretty(self).map_err(|e| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, data).map_err(|e| EngineError::ConfigWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "backupRoot": "/mnt/backup" }"#).expect("Failed to write");

        let config = Config::load(&path).expect("Config should load");
        assert_eq!(config.backup_root, PathBuf::from("/mnt/backup"));
        assert_eq!(config.key_file, None);
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.json");
        let mut config = Config::new("relative/backup");
        config.key_file = Some(PathBuf::from("mirror.key"));

        config.save(&path).expect("Config should save");
        let text = std::fs::read_to_string(&path).expect("Failed to read");
        assert!(text.contains("\n  \"backupRoot\": \"relative/backup\""));
        assert!(text.contains("\"keyFile\""));

        assert_eq!(Config::load(&path).expect("Config should load"), config);
    }

    #[test]
    fn test_missing_config_is_read_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = Config::load(&temp_dir.path().join("absent.json"));
        assert!(matches!(result, Err(EngineError::ConfigRead { .. })));
    }

    #[test]
    fn test_malformed_config_is_parse_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.json");

        for bad in ["not json", r#"{ "backupRoot": 42 }"#, "{}"] {
            std::fs::write(&path, bad).expect("Failed to write");
            assert!(
                matches!(Config::load(&path), Err(EngineError::ConfigParse { .. })),
                "{bad:?} should be rejected"
            );
        }
    }
}
