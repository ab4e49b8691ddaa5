// In-process grading for synchronous mode

use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, warn};

/// Grader output beyond this is treated as a failure.
pub const MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

const MAX_STDERR_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum GradeError {
    #[error("failed to start grader: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("grader timed out after {0:?}")]
    Timeout(Duration),

    #[error("grader exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("grader output exceeds {0} bytes")]
    OutputTooLarge(usize),

    #[error("grader i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns an augmented notebook into a result document.
#[async_trait]
pub trait Grader: Send + Sync {
    async fn grade(&self, notebook: &[u8]) -> Result<Vec<u8>, GradeError>;
}

/// Runs an external command: notebook on stdin, result JSON on stdout.
#[derive(Debug, Clone)]
pub struct CommandGrader {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandGrader {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Split a command line on whitespace. No shell quoting is interpreted.
    pub fn from_command_line(line: &str, timeout: Duration) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self::new(program, words.collect(), timeout))
    }
}

#[async_trait]
impl Grader for CommandGrader {
    #[tracing::instrument(skip(self, notebook), fields(program = %self.program, bytes = notebook.len()))]
    async fn grade(&self, notebook: &[u8]) -> Result<Vec<u8>, GradeError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(GradeError::Spawn)?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let e = std::io::Error::new(ErrorKind::Other, "grader pipes not captured");
                return Err(GradeError::Io(e));
            }
        };

        // the grader may exit without reading all of its input
        let stdin = child.stdin.take();
        let input = notebook.to_vec();
        let feed = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(&input).await {
                    debug!(error = %e, "Grader closed stdin early");
                }
            }
        });
        let errors = tokio::spawn(read_stderr(stderr));

        let run = async {
            let stdout = read_bounded(stdout, MAX_OUTPUT_BYTES).await?;
            if stdout.len() > MAX_OUTPUT_BYTES {
                child.start_kill()?;
                return Err(GradeError::OutputTooLarge(MAX_OUTPUT_BYTES));
            }
            let status = child.wait().await?;
            Ok::<_, GradeError>((status, stdout))
        };

        // an early return drops the child, which kills it
        let outcome = tokio::time::timeout(self.timeout, run).await;
        feed.abort();
        let (status, stdout) = match outcome {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                errors.abort();
                return Err(e);
            }
            Err(_) => {
                errors.abort();
                warn!(timeout = ?self.timeout, "Grader timed out");
                return Err(GradeError::Timeout(self.timeout));
            }
        };

        if !status.success() {
            let stderr = errors.await.ok().and_then(Result::ok).unwrap_or_default();
            return Err(GradeError::Failed {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        errors.abort();
        debug!(output_bytes = stdout.len(), "Grader finished");
        Ok(stdout)
    }
}

/// Read at most `limit + 1` bytes, enough to tell an oversized stream apart.
async fn read_bounded<R: AsyncRead + Unpin>(reader: R, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Keep the head of stderr for the error message and drain the rest.
async fn read_stderr(mut stderr: ChildStderr) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    (&mut stderr).take(MAX_STDERR_BYTES as u64).read_to_end(&mut buf).await?;
    tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await?;
    Ok(buf)
}
