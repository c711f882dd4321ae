//! Durable batch progress in `checkpoint.json`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use sieve_types::{CheckpointState, SourceFingerprint};
use sieve_utils::{AtomicWriteOptions, recover_bak_file, write_json_atomic};

pub const CHECKPOINT_FILE: &str = "checkpoint.json";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(
        "checkpoint {} was taken against a different candidate source ({} candidates, sha256 {}); current source has {} candidates, sha256 {}",
        path.display(),
        recorded.count,
        recorded.sha256,
        current.count,
        current.sha256
    )]
    SourceMismatch {
        path: PathBuf,
        recorded: SourceFingerprint,
        current: SourceFingerprint,
    },
    #[error("checkpoint I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<dir>/checkpoint.json`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CHECKPOINT_FILE))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the checkpoint, or a zero-valued state if there is none.
    pub fn load(&self) -> Result<CheckpointState, CheckpointError> {
        recover_bak_file(&self.path);

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CheckpointState::new(Utc::now()));
            }
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let state: CheckpointState =
            serde_json::from_str(&content).map_err(|source| CheckpointError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!(
            path = %self.path.display(),
            processed = state.processed_count,
            "Loaded checkpoint"
        );
        Ok(state)
    }

    /// Load and check that the state belongs to `current`.
    ///
    /// A fresh state adopts `current`; a state with no recorded fingerprint is
    /// accepted as long as its cursor fits inside the source.
    pub fn load_for_source(
        &self,
        current: &SourceFingerprint,
    ) -> Result<CheckpointState, CheckpointError> {
        let mut state = self.load()?;
        match &state.source_fingerprint {
            Some(recorded) if recorded != current => {
                return Err(CheckpointError::SourceMismatch {
                    path: self.path.clone(),
                    recorded: recorded.clone(),
                    current: current.clone(),
                });
            }
            None if state.resume_index() > current.count => {
                return Err(CheckpointError::SourceMismatch {
                    path: self.path.clone(),
                    recorded: SourceFingerprint {
                        count: state.resume_index(),
                        sha256: "unrecorded".to_string(),
                    },
                    current: current.clone(),
                });
            }
            _ => {}
        }
        state.source_fingerprint = Some(current.clone());
        Ok(state)
    }

    /// Atomically replace the checkpoint with `state`, stamping `updated_at`.
    pub fn save(&self, state: &mut CheckpointState) -> Result<(), CheckpointError> {
        state.updated_at = Utc::now();
        write_json_atomic(&self.path, state, AtomicWriteOptions::default()).map_err(|source| {
            CheckpointError::Io {
                path: self.path.clone(),
                source,
            }
        })?;
        tracing::debug!(
            path = %self.path.display(),
            processed = state.processed_count,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Remove the checkpoint. Missing files are not an error.
    pub fn delete(&self) -> Result<(), CheckpointError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
