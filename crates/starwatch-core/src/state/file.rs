// # File State Store
//
// File-based implementation of StateStore.
//
// ## Purpose
//
// Persists the watermark across daemon restarts so that already-announced
// repositories are never posted again.
//
// ## Durability
//
// - Atomic writes: new state goes to a temporary file, then rename
// - Corruption tolerance: a malformed file loads as an empty watermark
//   (logged as a warning), which triggers re-baselining rather than a crash
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "starred": ["owner/name", "..."],
//   "last_updated": "2025-01-09T12:00:00Z"
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::traits::state_store::{StateStore, Watermark};

/// State file format version, for future migration if the format changes
const STATE_FILE_VERSION: &str = "1.0";

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    starred: BTreeSet<String>,
    last_updated: chrono::DateTime<chrono::Utc>,
}

/// File-based watermark store with atomic writes.
///
/// Single-process, single-writer: the engine serializes saves, so no file
/// locking is needed.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Create a file state store, creating parent directories as needed.
    ///
    /// The file itself is only created on the first `save`.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(Self { path })
    }

    /// Path to the temporary file used for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<Watermark, Error> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "no state file, starting with empty watermark");
            return Ok(Watermark::empty());
        }

        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "could not read state file, starting with empty watermark"
                );
                return Ok(Watermark::empty());
            }
        };

        match serde_json::from_str::<StateFileFormat>(&content) {
            Ok(state) => {
                if state.version != STATE_FILE_VERSION {
                    tracing::warn!(
                        expected = STATE_FILE_VERSION,
                        got = %state.version,
                        "state file version mismatch, loading anyway"
                    );
                }
                tracing::debug!(tracked = state.starred.len(), "loaded watermark from file");
                Ok(Watermark {
                    starred: state.starred,
                    last_updated: state.last_updated,
                })
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "state file is corrupt, starting with empty watermark"
                );
                Ok(Watermark::empty())
            }
        }
    }

    async fn save(&self, watermark: &Watermark) -> Result<(), Error> {
        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            starred: watermark.starred.clone(),
            last_updated: watermark.last_updated,
        };

        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::state_store(format!("failed to serialize state: {}", e)))?;

        // Write to a temporary file, then atomically rename into place
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::state_store(format!(
                    "failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!(path = %self.path.display(), tracked = watermark.len(), "watermark written");
        Ok(())
    }
}
