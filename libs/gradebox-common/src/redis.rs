use crate::queue::{retry_with_backoff, Backoff, QueueClient, QueueError};
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use std::time::Duration;
use tracing::{debug, error, info};

/// Redis list semantics for the grading channels.
/// Keys are deterministic so the server and the execution engine never drift.

pub const QUEUE_PREFIX: &str = "gradebox:queue";

/// BLPOP timeout; a short one keeps consumers responsive to cancellation
const RECEIVE_TIMEOUT_SECONDS: f64 = 5.0;

/// Generate deterministic list key for a channel
pub fn queue_key(channel: &str) -> String {
    format!("{}:{}", QUEUE_PREFIX, channel)
}

/// Queue transport backed by Redis lists.
/// RPUSH to publish, BLPOP to consume (FIFO).
#[derive(Clone)]
pub struct RedisQueue {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisQueue {
    /// Connect, retrying with exponential backoff until the budget is spent.
    pub async fn connect(url: &str, backoff: Backoff) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let publisher = retry_with_backoff(backoff, "redis", || {
            ConnectionManager::new(client.clone())
        })
        .await
        .map_err(|e| QueueError::Connect(format!("{}: {}", url, e)))?;

        info!(url = %url, "Connected to Redis");
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl QueueClient for RedisQueue {
    async fn post(&self, channel: &str, payload: &[u8]) -> Result<(), QueueError> {
        let mut conn = self.publisher.clone();
        let key = queue_key(channel);
        let _: i64 = conn.rpush(&key, payload).await.map_err(|e| QueueError::Publish {
            channel: channel.to_string(),
            reason: e.to_string(),
        })?;
        debug!(channel = %channel, bytes = payload.len(), "Published payload");
        Ok(())
    }

    async fn receive(&self, channel: &str) -> Result<BoxStream<'static, Vec<u8>>, QueueError> {
        // A dedicated connection: BLPOP would otherwise stall the publisher.
        let conn = ConnectionManager::new(self.client.clone()).await?;
        let key = queue_key(channel);
        info!(channel = %channel, key = %key, "Listening on queue");

        let stream = futures_util::stream::unfold((conn, key), |(mut conn, key)| async move {
            loop {
                let popped: RedisResult<Option<(String, Vec<u8>)>> =
                    conn.blpop(&key, RECEIVE_TIMEOUT_SECONDS).await;
                match popped {
                    Ok(Some((_key, payload))) => return Some((payload, (conn, key))),
                    Ok(None) => continue,
                    Err(e) => {
                        error!(key = %key, error = %e, "Redis error while receiving");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
