//! Reader resume checkpoints.
//!
//! One small JSON file per reader: `{ "filePath", "lastFileSize", "savedAt" }`.
//! A missing or corrupt checkpoint is never fatal; the reader starts at 0.

use crate::error::CheckpointError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderCheckpoint {
    pub file_path: String,
    pub last_file_size: u64,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl ReaderCheckpoint {
    pub fn new(file_path: impl Into<String>, last_file_size: u64) -> Self {
        Self {
            file_path: file_path.into(),
            last_file_size,
            saved_at: Some(Utc::now()),
        }
    }

    /// Load a checkpoint. `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, CheckpointError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|source| CheckpointError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| CheckpointError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write via a temp file and rename so a crash never leaves half a file.
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let write_err = |source: std::io::Error| CheckpointError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(write_err)?;
        fs::rename(&tmp, path).map_err(write_err)
    }

    /// Offset to resume `source_path` from. Falls back to 0 on any problem or
    /// when the checkpoint belongs to a different file.
    pub fn resume_offset(path: &Path, source_path: &str) -> u64 {
        match Self::load(path) {
            Ok(Some(checkpoint)) if checkpoint.file_path == source_path => {
                info!(
                    "Resuming {} from offset {} (checkpoint {})",
                    source_path,
                    checkpoint.last_file_size,
                    path.display()
                );
                checkpoint.last_file_size
            }
            Ok(Some(checkpoint)) => {
                info!(
                    "Checkpoint {} is for {}, not {}; starting at 0",
                    path.display(),
                    checkpoint.file_path,
                    source_path
                );
                0
            }
            Ok(None) => 0,
            Err(e) => {
                warn!("Ignoring unreadable checkpoint: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main_state.json");

        ReaderCheckpoint::new("/logs/console.log", 4096)
            .save(&path)
            .unwrap();

        assert_eq!(ReaderCheckpoint::resume_offset(&path, "/logs/console.log"), 4096);
        // Different file: start over
        assert_eq!(ReaderCheckpoint::resume_offset(&path, "/logs/other.log"), 0);
    }

    #[test]
    fn test_missing_and_corrupt_fall_back_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing_state.json");
        assert_eq!(ReaderCheckpoint::resume_offset(&missing, "/x"), 0);

        let corrupt = dir.path().join("corrupt_state.json");
        fs::write(&corrupt, "{ not json").unwrap();
        assert!(matches!(
            ReaderCheckpoint::load(&corrupt),
            Err(CheckpointError::Corrupt { .. })
        ));
        assert_eq!(ReaderCheckpoint::resume_offset(&corrupt, "/x"), 0);
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(ReaderCheckpoint::new("/a", 7)).unwrap();
        assert_eq!(json["filePath"], "/a");
        assert_eq!(json["lastFileSize"], 7);
    }

    #[test]
    fn test_save_creates_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/main_state.json");
        ReaderCheckpoint::new("/a", 1).save(&path).unwrap();
        assert!(path.exists());
    }
}
