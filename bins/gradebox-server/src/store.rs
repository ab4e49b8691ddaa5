//! Submission & Result Store
//!
//! One directory holds both halves of a submission's life:
//! - `{id}.ipynb`: the augmented submission, written once at ingestion
//! - `{id}.txt`: the result, written (and possibly overwritten) by the consumer
//!
//! Every write goes to a temporary file in the same directory and is renamed
//! into place, so pollers never observe a partially written file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

pub const SUBMISSION_EXT: &str = "ipynb";
pub const RESULT_EXT: &str = "txt";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid submission id {0:?}")]
    InvalidId(String),

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a result write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    /// A result already existed and was replaced (redelivery).
    Replaced,
}

#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

/// Submission IDs end up in file names; only a conservative alphabet is let
/// through so an ID can never name a path outside the store.
pub fn validate_id(id: &str) -> Result<(), StoreError> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if needed.
    pub async fn ensure_dir(&self) -> Result<(), StoreError> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder
            .create(&self.dir)
            .await
            .map_err(|e| io_error("creating", &self.dir, e))
    }

    fn path_for(&self, id: &str, ext: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{}.{}", id, ext)))
    }

    pub async fn write_submission(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(id, SUBMISSION_EXT)?;
        self.write_atomic(&path, bytes).await
    }

    pub async fn read_submission(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(id, SUBMISSION_EXT)?;
        read_optional(&path).await
    }

    /// Store the result for `id`. Last write wins; the outcome reports whether
    /// an earlier result was replaced.
    pub async fn write_result(&self, id: &str, bytes: &[u8]) -> Result<WriteOutcome, StoreError> {
        let path = self.path_for(id, RESULT_EXT)?;
        let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
        self.write_atomic(&path, bytes).await?;
        Ok(if existed {
            WriteOutcome::Replaced
        } else {
            WriteOutcome::Created
        })
    }

    pub async fn read_result(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(id, RESULT_EXT)?;
        read_optional(&path).await
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp = self.dir.join(format!(".tmp-{}", Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            return Err(io_error("writing", &tmp, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error("renaming into", path, e));
        }
        debug!(path = %path.display(), bytes = bytes.len(), "Stored file");
        Ok(())
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error("reading", path, e)),
    }
}

fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        op,
        path: path.display().to_string(),
        source,
    }
}
