//! Persisted tracking state for the merge engine.
//!
//! `tracked_jobs.json` under the state directory is the current state. Every
//! save also lands in a content-addressed archive so earlier runs stay
//! inspectable.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use jobmerge_core::{RunContext, TrackedRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobmerge-storage";

pub const STATE_SCHEMA_VERSION: u32 = 1;
pub const CURRENT_STATE_FILE: &str = "tracked_jobs.json";
pub const HISTORY_DIR: &str = "history";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file {} is not a valid snapshot: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("state file {} has schema version {found}, expected {expected}", .path.display())]
    UnsupportedVersion { path: PathBuf, found: u32, expected: u32 },
    #[error("encoding state snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}

fn io_error<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> StateError + 'a {
    move |source| StateError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// The full tracked collection written at the end of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub written_at: DateTime<Utc>,
    pub records: Vec<TrackedRecord>,
}

impl StateSnapshot {
    pub fn new(ctx: &RunContext, records: Vec<TrackedRecord>) -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            run_id: ctx.run_id,
            written_at: ctx.started_at,
            records,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SavedState {
    pub content_hash: String,
    pub current_path: PathBuf,
    pub archive_path: PathBuf,
    pub byte_size: usize,
    pub archive_deduplicated: bool,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn current_path(&self) -> PathBuf {
        self.root.join(CURRENT_STATE_FILE)
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn archive_relative_path(&self, written_at: DateTime<Utc>, content_hash: &str) -> PathBuf {
        PathBuf::from(HISTORY_DIR)
            .join(written_at.format("%Y%m%d_%H%M%S").to_string())
            .join(format!("{content_hash}.json"))
    }

    /// Current state, or `None` before the first run ever saved one.
    pub async fn load(&self) -> Result<Option<StateSnapshot>, StateError> {
        let path = self.current_path();
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no prior state");
                return Ok(None);
            }
            Err(err) => return Err(io_error("reading state file", &path)(err)),
        };

        let snapshot: StateSnapshot = serde_json::from_slice(&bytes).map_err(|source| StateError::Corrupt {
            path: path.clone(),
            source,
        })?;
        if snapshot.schema_version != STATE_SCHEMA_VERSION {
            return Err(StateError::UnsupportedVersion {
                path,
                found: snapshot.schema_version,
                expected: STATE_SCHEMA_VERSION,
            });
        }
        debug!(records = snapshot.records.len(), run_id = %snapshot.run_id, "loaded prior state");
        Ok(Some(snapshot))
    }

    /// Archives the snapshot, then replaces the current state file.
    pub async fn save(&self, snapshot: &StateSnapshot) -> Result<SavedState, StateError> {
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(StateError::Encode)?;
        let content_hash = Self::sha256_hex(&bytes);

        let archive_path = self
            .root
            .join(self.archive_relative_path(snapshot.written_at, &content_hash));
        let archive_deduplicated = fs::try_exists(&archive_path)
            .await
            .map_err(io_error("checking archive path", &archive_path))?;
        if !archive_deduplicated {
            write_atomic(&archive_path, &bytes).await?;
        }

        let current_path = self.current_path();
        write_atomic(&current_path, &bytes).await?;

        info!(
            run_id = %snapshot.run_id,
            records = snapshot.records.len(),
            hash = %content_hash,
            archive_deduplicated,
            "saved tracking state"
        );
        Ok(SavedState {
            content_hash,
            current_path,
            archive_path,
            byte_size: bytes.len(),
            archive_deduplicated,
        })
    }
}

/// Temp file in the target directory, then rename over the target.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StateError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .map_err(io_error("creating state directory", parent))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .map_err(io_error("opening temp state file", &temp_path))?;

    let written = fill_and_rename(file, &temp_path, path, bytes).await;
    if written.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }
    written
}

async fn fill_and_rename(
    mut file: fs::File,
    temp_path: &Path,
    path: &Path,
    bytes: &[u8],
) -> Result<(), StateError> {
    file.write_all(bytes)
        .await
        .map_err(io_error("writing temp state file", temp_path))?;
    file.flush()
        .await
        .map_err(io_error("flushing temp state file", temp_path))?;
    drop(file);
    fs::rename(temp_path, path)
        .await
        .map_err(io_error("renaming temp state file to", path))
}
