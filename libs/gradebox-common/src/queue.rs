//! Queue boundary between the server and the execution engine.
//!
//! Two operations only: publish a payload to a named channel, and obtain the
//! unbounded stream of payloads arriving on a channel. Delivery is
//! at-least-once; neither operation retries on its own once connected.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue connection failed: {0}")]
    Connect(String),

    #[error("publish to {channel} failed: {reason}")]
    Publish { channel: String, reason: String },

    #[error("channel {0} is already being consumed")]
    AlreadyConsumed(String),

    #[error("channel {0} is closed")]
    Closed(String),

    #[error(transparent)]
    Redis(#[from] ::redis::RedisError),
}

#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Publish one payload. Callers assume at-least-once semantics.
    async fn post(&self, channel: &str, payload: &[u8]) -> Result<(), QueueError>;

    /// Start consuming a channel. The returned stream suspends while the
    /// channel is empty and is not restartable.
    async fn receive(&self, channel: &str) -> Result<BoxStream<'static, Vec<u8>>, QueueError>;
}

/// Exponential backoff used while establishing the queue connection.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial_delay: Duration,
    pub max_total_wait: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_total_wait: Duration::from_secs(60),
        }
    }
}

/// Retry `op` with doubling delays until it succeeds or the total wait budget
/// is spent, in which case the last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(backoff: Backoff, what: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let deadline = Instant::now() + backoff.max_total_wait;
    let mut delay = backoff.initial_delay;
    let mut attempt: u32 = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(component = what, attempt, "Connected after retrying");
                }
                return Ok(value);
            }
            Err(e) => {
                if Instant::now() >= deadline {
                    return Err(e);
                }
                warn!(
                    component = what,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Connection attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
        }
    }
}
