// Best-effort mirroring of accepted submissions

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::metrics;

/// Secondary copy of submissions for later inspection. Failures never reach
/// the uploader.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, name: &str, bytes: &[u8]) -> std::io::Result<()>;
}

/// Mirrors submissions into a local directory (typically a mounted bucket).
#[derive(Debug, Clone)]
pub struct DirectoryAudit {
    dir: PathBuf,
}

impl DirectoryAudit {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl AuditSink for DirectoryAudit {
    async fn record(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(name), bytes).await
    }
}

/// Fire-and-forget: spawn the write and log the outcome.
pub fn spawn_record(sink: Arc<dyn AuditSink>, name: String, bytes: Vec<u8>) {
    tokio::spawn(async move {
        match sink.record(&name, &bytes).await {
            Ok(()) => debug!(name = %name, "Mirrored submission"),
            Err(e) => {
                metrics::AUDIT_FAILURES.inc();
                warn!(name = %name, error = %e, "Failed to mirror submission");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_audit_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryAudit::new(dir.path().join("mirror"));
        sink.record("abc.ipynb", b"{}").await.unwrap();

        let written = std::fs::read(dir.path().join("mirror/abc.ipynb")).unwrap();
        assert_eq!(written, b"{}".to_vec());
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where the directory should be
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();

        let sink = DirectoryAudit::new(&blocker);
        assert!(sink.record("abc.ipynb", b"{}").await.is_err());
    }
}
